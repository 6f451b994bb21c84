use thiserror::Error;

#[derive(Error, Debug)]
pub enum IniError {
    #[error("content is not valid UTF-8 (first invalid byte at offset {offset})")]
    Decode {
        offset: usize,
        #[source]
        source: std::str::Utf8Error,
    },
}
