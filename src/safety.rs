//! Output-path guards for the CLI.

use anyhow::{bail, Result};
use std::path::Path;

/// Refuse an output path that would clobber one of the input files.
pub fn ensure_distinct_output(output: &Path, inputs: &[&Path]) -> Result<()> {
    for input in inputs {
        if output == *input {
            bail!(
                "output '{}' would overwrite input '{}'",
                output.display(),
                input.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_distinct_paths_pass() {
        let out = PathBuf::from("/tmp/unmatched.json");
        let a = PathBuf::from("/tmp/spotify.json");
        let b = PathBuf::from("/tmp/tidal.json");
        assert!(ensure_distinct_output(&out, &[&a, &b]).is_ok());
    }

    #[test]
    fn test_overwriting_input_is_refused() {
        let path = PathBuf::from("/tmp/spotify.json");
        assert!(ensure_distinct_output(&path, &[&path]).is_err());
    }
}
