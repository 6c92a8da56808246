pub mod downloader;
pub mod library;
pub mod naver;
pub mod position;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
