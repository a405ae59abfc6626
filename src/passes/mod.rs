//! Processing passes, run in order over one `TranscriptionState`

pub mod pass_0;
pub mod pass_1;
pub mod pass_2;
pub mod pass_3;
