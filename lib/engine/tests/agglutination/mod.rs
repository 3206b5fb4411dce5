#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

mod merging;
mod simple;
mod test_utils;
