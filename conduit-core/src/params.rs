//! Extra pipeline parameters
//!
//! The `params` query parameter carries extra command-line arguments as a
//! single string quoted the way `/bin/sh` would read it.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("\"{input}\" could not be split into shell parameters: {source}")]
pub struct ParamsError {
    pub input: String,
    #[source]
    pub source: shell_words::ParseError,
}

/// Split a shell-quoted parameter string into individual arguments
pub fn split_params(input: &str) -> Result<Vec<String>, ParamsError> {
    shell_words::split(input).map_err(|source| ParamsError {
        input: input.to_string(),
        source,
    })
}

/// Quote arguments so that [`split_params`] yields them back unchanged
pub fn join_params<I, S>(params: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    shell_words::join(params)
}
