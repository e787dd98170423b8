use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq, Eq)]
pub enum ReceiveError {
    /// The sender was dropped without ever producing a value.
    Closed,
    Other(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// The receiver was dropped; nobody will ever observe the value.
    Closed,
    Other(String),
}

impl Display for ReceiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiveError::Closed => write!(f, "Channel closed"),
            ReceiveError::Other(msg) => write!(f, "Cannot wait for message: {}", msg),
        }
    }
}

impl Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Closed => write!(f, "Channel closed"),
            SendError::Other(msg) => write!(f, "Cannot send message: {}", msg),
        }
    }
}

impl Error for ReceiveError {}
impl Error for SendError {}
