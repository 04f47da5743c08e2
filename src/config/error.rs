use std::io;
use thiserror::Error;

/// Everything that can go wrong while compiling a configuration file.
///
/// All of these are fatal: the server never starts from a partially valid
/// configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    // File level
    #[error("Configuration file not found")]
    FileNotFound,

    #[error("Permission denied when accessing configuration file")]
    PermissionDenied,

    #[error("Configuration file is empty")]
    FileEmpty,

    #[error("Configuration file is malformed")]
    MalformedFile,

    #[error("Unexpected end of file (unclosed block)")]
    UnexpectedEof,

    #[error("Unknown configuration directive: {0}")]
    UnknownKey(String),

    #[error("No server block found in configuration")]
    NoServers,

    // Server block
    #[error("Invalid server block configuration")]
    InvalidServerBlock,

    #[error("Invalid port configuration (must be 1024-65535)")]
    InvalidPort,

    #[error("Server block has no listen directive")]
    MissingPort,

    #[error("Invalid host configuration")]
    InvalidHost,

    #[error("Invalid server name")]
    InvalidServerName,

    #[error("Duplicate server name or server:port combination: {0}")]
    DuplicateServer(String),

    #[error("Invalid client_max_body_size value (must be positive)")]
    InvalidClientMaxBodySize,

    #[error("Invalid error page (code must be 100-599, followed by a path)")]
    InvalidErrorPage,

    // Location block
    #[error("Invalid root path: {0}")]
    InvalidRootPath(String),

    #[error("Invalid location block configuration")]
    InvalidLocationBlock,

    #[error("Invalid location prefix")]
    InvalidPrefix,

    #[error("Duplicate location path: {0}")]
    DuplicateLocation(String),

    #[error("Invalid index file: {0}")]
    InvalidIndex(String),

    #[error("Invalid allowed methods")]
    InvalidAllowedMethods,

    #[error("Invalid autoindex value (use 'on' or 'off')")]
    InvalidAutoindex,

    #[error("Invalid CGI path: {0}")]
    InvalidCgiPath(String),

    #[error("Invalid redirection in location block")]
    InvalidRedirect,

    #[error("Invalid upload path")]
    InvalidUploadPath,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
