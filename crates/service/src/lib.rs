pub mod poll;

pub use poll::PollService;
