//! Linux namespace management for process isolation.

pub mod pid;
