mod common;
mod progress_tests;
mod session_tests;
mod sink_tests;
