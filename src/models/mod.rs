pub mod job;
pub mod pattern;
pub mod webhook;
