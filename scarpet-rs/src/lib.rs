//! `scarpet`: an embeddable expression language plus a small tick-driven
//! console host.
//!
//! The language lives in [`script`]; everything else is the host binary's
//! plumbing (command line, rc file, scheduler, console, event loop).

pub mod cli;
pub mod config;
pub mod console;
pub mod event_loop;
pub mod process;
pub mod script;
