use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no camera found: indices 0..{probed} all failed to open")]
    NoCamera { probed: i32 },
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("model: {0}")]
    Model(String),
    #[error("window: {0}")]
    Window(String),
    #[error("invalid color {0}")]
    InvalidColor(String),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl Error {
    pub fn window(err: impl std::fmt::Display) -> Self {
        Error::Window(err.to_string())
    }
}
