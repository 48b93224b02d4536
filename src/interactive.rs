//! Console question/answer loop.

use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::engine::RetrievalEngine;
use crate::error::RagError;

pub const PROMPT: &str = "Pergunta: ";
pub const GREETING: &str = "Em que posso ajudar?";
pub const FAREWELL: &str = "Até à próxima!";
pub const RETRY_HINT: &str = "Tenta novamente ou verifica se o Ollama está ativo.";
pub const EXIT_TOKENS: [&str; 5] = ["sair", "exit", "quit", "q", "s"];
const SEPARATOR_WIDTH: usize = 90;

pub fn is_exit_token(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    EXIT_TOKENS.contains(&line.as_str())
}

/// Reads one question per line from `input` until an exit token or EOF.
///
/// Errors while answering a question are reported on `output` and the loop
/// moves on to the next line. Only I/O failures on the console itself end
/// the session early.
pub async fn run_session<R, W>(
    engine: &RetrievalEngine,
    input: R,
    output: &mut W,
    streaming: bool,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let separator = "-".repeat(SEPARATOR_WIDTH);
    writeln!(output, "\n{}", GREETING)?;

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit_token(query) {
            writeln!(output, "{}", FAREWELL)?;
            break;
        }

        writeln!(output, "\nResposta:")?;
        if streaming {
            match engine.answer_stream(query).await {
                Ok(mut chunks) => {
                    let mut failure = None;
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(text) => {
                                write!(output, "{}", text)?;
                                output.flush()?;
                            }
                            Err(e) => {
                                warn!(error = %e, "stream interrupted");
                                failure = Some(RagError::from(e));
                                break;
                            }
                        }
                    }
                    writeln!(output)?;
                    if let Some(e) = failure {
                        report_failure(output, &e.client_message())?;
                    }
                }
                Err(e) => report_failure(output, &e.client_message())?,
            }
        } else {
            match engine.answer(query).await {
                Ok(answer) => writeln!(output, "{}", answer.text)?,
                Err(e) => report_failure(output, &e.client_message())?,
            }
        }
        writeln!(output, "{}", separator)?;
    }
    Ok(())
}

fn report_failure<W: Write>(output: &mut W, message: &str) -> std::io::Result<()> {
    writeln!(output, "Erro ao processar a pergunta: {}", message)?;
    writeln!(output, "{}", RETRY_HINT)
}
