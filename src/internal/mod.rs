//! Internal building blocks (the recovered object model) that power the public API.

pub mod object;
