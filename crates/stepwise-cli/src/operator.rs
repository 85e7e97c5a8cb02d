//! Human operator on a line-oriented terminal

use async_trait::async_trait;
use std::fmt::Write as _;
use std::io::{self, BufRead};
use stepwise_escalation::{resolve_choice, HumanOperator, HumanRequest, OperatorError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::{mpsc, Mutex};

/// Lines read ahead of the operator
const LINE_BUFFER: usize = 8;

type Lines = mpsc::Receiver<io::Result<String>>;

/// Operator answering on stdin, prompting on stdout
pub type TerminalOperator = LineOperator<Stdout>;

/// Asks on `output`, reads one answer line per attempt from its input
///
/// Input is pumped into a channel by a separate reader, so an abandoned
/// answer loses no line. Invalid choices are re-prompted; end of input
/// closes the operator.
#[derive(Debug)]
pub struct LineOperator<W> {
    input: Mutex<Lines>,
    output: Mutex<W>,
}

impl TerminalOperator {
    /// Operator on the process terminal
    ///
    /// Stdin is read on a dedicated thread: a pending read never holds up
    /// runtime shutdown.
    ///
    /// # Errors
    /// When the reader thread cannot be started
    pub fn stdio() -> io::Result<Self> {
        Self::from_blocking(io::BufReader::new(io::stdin()), tokio::io::stdout())
    }
}

impl<W> LineOperator<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Read lines from an async reader on a background task
    ///
    /// # Panics
    /// Outside a Tokio runtime
    #[must_use]
    pub fn new<R>(input: R, output: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(pump(input, tx));
        Self::from_lines(rx, output)
    }

    /// Read lines from a blocking reader on a dedicated thread
    ///
    /// # Errors
    /// When the thread cannot be started
    pub fn from_blocking<R>(input: R, output: W) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::Builder::new()
            .name("operator-input".to_string())
            .spawn(move || pump_blocking(input, &tx))?;
        Ok(Self::from_lines(rx, output))
    }

    /// Answer from an existing line channel
    #[must_use]
    pub fn from_lines(input: Lines, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Give back the writer
    pub fn into_output(self) -> W {
        self.output.into_inner()
    }
}

async fn pump<R: AsyncBufRead + Unpin>(mut input: R, lines: mpsc::Sender<io::Result<String>>) {
    loop {
        let mut line = String::new();
        let item = match input.read_line(&mut line).await {
            Ok(0) => return,
            Ok(_) => Ok(line),
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if lines.send(item).await.is_err() || failed {
            return;
        }
    }
}

fn pump_blocking<R: BufRead>(mut input: R, lines: &mpsc::Sender<io::Result<String>>) {
    loop {
        let mut line = String::new();
        let item = match input.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => Ok(line),
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if lines.blocking_send(item).is_err() || failed {
            return;
        }
    }
}

fn prompt(request: &HumanRequest) -> String {
    let mut text = format!("\n[human input needed] {}\n", request.question);
    for (index, option) in request.options.iter().flatten().enumerate() {
        let _ = writeln!(text, "  {}. {option}", index + 1);
    }
    text.push_str("> ");
    text
}

async fn write_all<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<(), OperatorError> {
    output
        .write_all(text.as_bytes())
        .await
        .map_err(|e| OperatorError::Input(e.to_string()))?;
    output
        .flush()
        .await
        .map_err(|e| OperatorError::Input(e.to_string()))
}

#[async_trait]
impl<W> HumanOperator for LineOperator<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn answer(&self, request: &HumanRequest) -> Result<String, OperatorError> {
        let mut input = self.input.lock().await;
        let mut output = self.output.lock().await;
        write_all(&mut *output, &prompt(request)).await?;

        loop {
            let line = match input.recv().await {
                None => return Err(OperatorError::Closed),
                Some(Err(e)) => return Err(OperatorError::Input(e.to_string())),
                Some(Ok(line)) => line,
            };

            match resolve_choice(&line, request.options.as_deref()) {
                Ok(answer) => return Ok(answer),
                Err(OperatorError::InvalidChoice(choice)) => {
                    write_all(&mut *output, &format!("invalid choice `{choice}`, try again\n> ")).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
