//! Command-level tests

mod test_build_search;
mod test_repl;
