use super::*;
use serde::Serialize;
use std::io::{self, Write};

pub(in crate::cli) fn print_json_line<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let line = serde_json::to_string(value).context("serialize output")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}").context("write output")?;
    stdout.flush().context("flush output")?;
    Ok(())
}

/// Prints responses and turns any failure into a non-zero exit.
pub(in crate::cli) fn finish_responses(responses: &[Response]) -> anyhow::Result<()> {
    for response in responses {
        print_json_line(response)?;
    }
    let failed = count_failures(responses);
    if failed > 0 {
        anyhow::bail!("{failed} of {} operations failed", responses.len());
    }
    Ok(())
}

pub(in crate::cli) fn count_failures(responses: &[Response]) -> usize {
    responses.iter().filter(|response| response.is_failure()).count()
}
