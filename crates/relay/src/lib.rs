//! Session logic between the front end and the provider adapters: prompt
//! assembly, transcript polling, dialogue history, and the background worker
//! that relays stream deltas to an event sink.

pub mod history;
pub mod prompt;
pub mod transcript;
pub mod worker;
