use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::warn;
use url::Url;

use crate::mapper::FilePicker;

/// Asks for replacement files on a line-oriented prompt.
pub(crate) struct PromptPicker<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptPicker<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, original: &Url, current_base: Option<&str>) -> io::Result<Option<PathBuf>> {
        writeln!(self.output, "Cannot find {original}")?;
        if let Some(base) = current_base {
            writeln!(self.output, "  declared base: {base}")?;
        }
        write!(self.output, "Local path of this file (blank to skip): ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(answer)))
    }
}

impl<R: BufRead, W: Write> FilePicker for PromptPicker<R, W> {
    fn pick_replacement_file(
        &mut self,
        original: &Url,
        current_base: Option<&str>,
    ) -> Option<PathBuf> {
        match self.ask(original, current_base) {
            Ok(answer) => answer,
            Err(err) => {
                warn!("prompt for {original} failed: {err}");
                None
            }
        }
    }
}

/// Picker reading answers from stdin and prompting on stderr.
pub(crate) fn stdin_picker() -> PromptPicker<io::StdinLock<'static>, io::Stderr> {
    PromptPicker::new(io::stdin().lock(), io::stderr())
}
