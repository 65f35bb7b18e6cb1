//! Console front end for the parley consultant.
//!
//! Reads one message per line from stdin and prints the assistant's reply.
//! Lines starting with `/` are commands answered locally.

pub mod app;
pub mod command;
pub mod config;
