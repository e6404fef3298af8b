//! Subprocess output relay
//!
//! Runs a child process and copies its stdout and stderr to a shared sink as
//! the bytes arrive, inserting a prefix at the start of every line. Progress
//! output from rsync rewrites lines with `\r`, so a carriage return starts a
//! new prefixed line too.
//!
//! Both streams are drained by their own scoped thread, and the optional stdin
//! payload is fed from a third, so a child that fills one pipe while we wait on
//! another can never stall. All threads are joined before `wait()`.

use std::io::{self, BufWriter, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use parking_lot::Mutex;

const CHUNK: usize = 8 * 1024;

/// Copy `reader` into `sink`, writing `prefix` before each line
fn relay_stream<R: Read, W: Write>(mut reader: R, prefix: &[u8], sink: &Mutex<W>) -> io::Result<()> {
    let mut buf = [0u8; CHUNK];
    let mut out = Vec::with_capacity(CHUNK + prefix.len() * 4);
    let mut at_line_start = true;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        out.clear();
        for &b in &buf[..n] {
            if at_line_start {
                out.extend_from_slice(prefix);
            }
            out.push(b);
            at_line_start = b == b'\n' || b == b'\r';
        }

        let mut sink = sink.lock();
        sink.write_all(&out)?;
        sink.flush()?;
    }
}

/// Write `lines` to the child's stdin, one per line, then close it
fn feed_stdin<W: Write>(pipe: W, lines: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(pipe);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn joined<T>(handle: thread::ScopedJoinHandle<'_, io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "relay thread panicked")))
}

/// Run `command`, relaying its output to `sink` with `prefix` on every line.
///
/// When `stdin_lines` is given each entry is written to the child's stdin
/// followed by a newline; otherwise stdin is closed.
pub fn run_relayed<W: Write + Send>(
    mut command: Command,
    stdin_lines: Option<&[String]>,
    prefix: &str,
    sink: &Mutex<W>,
) -> io::Result<ExitStatus> {
    command
        .stdin(if stdin_lines.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let prefix = prefix.as_bytes();

    let (fed, out, err) = thread::scope(|s| {
        let feeder = stdin.map(|pipe| {
            let lines = stdin_lines.unwrap_or(&[]);
            s.spawn(move || feed_stdin(pipe, lines))
        });
        let out = stdout.map(|r| s.spawn(move || relay_stream(r, prefix, sink)));
        let err = stderr.map(|r| s.spawn(move || relay_stream(r, prefix, sink)));

        (
            feeder.map(joined).unwrap_or(Ok(())),
            out.map(joined).unwrap_or(Ok(())),
            err.map(joined).unwrap_or(Ok(())),
        )
    });

    let status = child.wait()?;

    // A child that exits before reading all of its input is judged by its exit status
    match fed {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
        _ => {}
    }
    out?;
    err?;
    Ok(status)
}
