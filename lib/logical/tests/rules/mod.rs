#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

mod filter_push_down;
mod flatten;
mod pipeline;
mod test_utils;
