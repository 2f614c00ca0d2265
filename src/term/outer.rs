use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

use super::TermError;

/// The invoking terminal, as owned duplicates of its input and output
/// descriptors. Mode changes and size queries go through the input side
/// unless a separate control descriptor is given.
pub struct OuterTerminal {
    control: Option<File>,
    input: File,
    output: File,
}

impl OuterTerminal {
    /// Duplicate the process's stdin and stdout (close-on-exec).
    pub fn stdio() -> Result<Self, TermError> {
        let input = io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|source| TermError::Duplicate {
                stream: "stdin",
                source,
            })?;
        let output = io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .map_err(|source| TermError::Duplicate {
                stream: "stdout",
                source,
            })?;
        Ok(Self::new(File::from(input), File::from(output)))
    }

    pub fn new(input: File, output: File) -> Self {
        Self {
            control: None,
            input,
            output,
        }
    }

    /// Relay `input` and `output` but snapshot, switch and measure the
    /// terminal behind `control`.
    pub fn with_control(control: File, input: File, output: File) -> Self {
        Self {
            control: Some(control),
            input,
            output,
        }
    }

    /// Descriptor used for mode snapshots and window-size queries.
    pub fn control(&self) -> BorrowedFd<'_> {
        self.control.as_ref().unwrap_or(&self.input).as_fd()
    }

    pub fn input(&self) -> &File {
        &self.input
    }

    pub fn output(&self) -> &File {
        &self.output
    }
}
