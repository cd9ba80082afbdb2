pub mod dispatch;
pub mod notify;
pub mod presence;
pub mod scoring;
pub mod transitions;
