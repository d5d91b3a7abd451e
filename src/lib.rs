pub mod backend;
pub mod config;
pub mod pipeline;
pub mod podchaser;
pub mod retry;
pub mod selector;
pub mod transcript;
mod serde;

/// `pretty_env_logger` with `RUST_LOG`, falling back to `info`.
pub fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}
