pub mod scales;
pub mod intervals;
pub mod patterns;
pub mod interval_patterns;
pub mod pitch;
pub mod playback;
pub mod session;
pub mod practice_log;
pub mod config;
