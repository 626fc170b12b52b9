use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::driver::DeviceDriver;
use crate::ops::FlatFS;
use crate::util::format::pretty_size_from_bytes;

const HELP: &str = "init, create <name>, write <name> <text>, read <name>, delete <name>, list, \
                    showbitmap, recover, optimize, info, exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Init,
    Create(String),
    /// Everything after the name (minus one separator) is the payload.
    Write { name: String, data: String },
    Read(String),
    Delete(String),
    List,
    ShowBitmap,
    Recover,
    Optimize,
    Info,
    Exit,
    Empty,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}'")]
    Unknown(String),

    #[error("Usage: {0} <name>")]
    MissingName(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let name = |usage: &'static str| {
            rest.split_whitespace()
                .next()
                .map(str::to_string)
                .ok_or(CommandError::MissingName(usage))
        };

        Ok(match command {
            "" => Command::Empty,
            "help" => Command::Help,
            "init" => Command::Init,
            "create" => Command::Create(name("create")?),
            "write" => {
                let rest = rest.trim_start();
                let (name, data) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if name.is_empty() {
                    return Err(CommandError::MissingName("write"));
                }
                Command::Write { name: name.to_string(), data: data.to_string() }
            }
            "read" => Command::Read(name("read")?),
            "delete" => Command::Delete(name("delete")?),
            "list" => Command::List,
            "showbitmap" => Command::ShowBitmap,
            "recover" => Command::Recover,
            "optimize" => Command::Optimize,
            "info" => Command::Info,
            "exit" | "quit" => Command::Exit,
            other => return Err(CommandError::Unknown(other.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented front end over a `FlatFS`. Operation failures are printed
/// and the session goes on; only errors on `out` end it.
pub struct Shell<D: DeviceDriver> {
    fs: FlatFS<D>,
}

impl<D: DeviceDriver> Shell<D> {
    pub fn new(fs: FlatFS<D>) -> Shell<D> {
        Shell { fs }
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        writeln!(out, "flatfs shell - type 'help' for commands.")?;
        let mut lines = input.lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            if self.execute(&line?, out)? == Flow::Exit {
                break;
            }
        }
        Ok(())
    }

    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(out, "{}", err)?;
                return Ok(Flow::Continue);
            }
        };

        if let Err(err) = self.dispatch(command.clone(), out)? {
            writeln!(out, "Error: {}", err)?;
        }
        Ok(if command == Command::Exit { Flow::Exit } else { Flow::Continue })
    }

    /// The outer result is output failure, the inner one the operation's.
    fn dispatch<W: Write>(
        &mut self,
        command: Command,
        out: &mut W,
    ) -> io::Result<crate::Result<()>> {
        let fs = &mut self.fs;
        match command {
            Command::Empty | Command::Exit => {}
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Init => {
                let geometry = fs.geometry();
                if let Err(err) = fs.format(geometry) {
                    return Ok(Err(err));
                }
                writeln!(out, "Filesystem initialized ({} bytes).", geometry.capacity_bytes())?;
            }
            Command::Create(name) => {
                if let Err(err) = fs.create_file(&name) {
                    return Ok(Err(err));
                }
                writeln!(out, "Created file '{}'.", name)?;
            }
            Command::Write { name, data } => {
                if let Err(err) = fs.write(&name, data.as_bytes()) {
                    return Ok(Err(err));
                }
                writeln!(out, "Wrote {} bytes to '{}'.", data.len(), name)?;
            }
            Command::Read(name) => {
                let data = match fs.read(&name) {
                    Ok(data) => data,
                    Err(err) => return Ok(Err(err)),
                };
                writeln!(out, "----- content of '{}' ({} bytes) -----", name, data.len())?;
                writeln!(out, "{}", String::from_utf8_lossy(&data))?;
                writeln!(out, "-------------------------------------------")?;
            }
            Command::Delete(name) => {
                if let Err(err) = fs.delete(&name) {
                    return Ok(Err(err));
                }
                writeln!(out, "File '{}' marked deleted.", name)?;
            }
            Command::List => {
                writeln!(
                    out,
                    "{:<4}{:<34}{:<10}{:<8}{:<8}",
                    "ID", "Name", "Size", "Blocks", "Deleted"
                )?;
                for entry in fs.list() {
                    writeln!(
                        out,
                        "{:<4}{:<34}{:<10}{:<8}{:<8}",
                        entry.slot,
                        entry.name,
                        entry.size,
                        entry.block_count,
                        if entry.deleted { "Y" } else { "N" }
                    )?;
                }
            }
            Command::ShowBitmap => {
                let summary = fs.bitmap_summary();
                writeln!(
                    out,
                    "Blocks: {}, Used: {}, Free: {}",
                    summary.total, summary.used, summary.free
                )?;
            }
            Command::Recover => {
                writeln!(out, "Recovering filesystem from journal...")?;
                let report = match fs.recover() {
                    Ok(report) => report,
                    Err(err) => return Ok(Err(err)),
                };
                writeln!(
                    out,
                    "Recovery completed ({} records applied, {} skipped).",
                    report.applied, report.skipped
                )?;
            }
            Command::Optimize => {
                writeln!(out, "Optimizing filesystem (defragmenting)...")?;
                let report = match fs.defragment() {
                    Ok(report) => report,
                    Err(err) => return Ok(Err(err)),
                };
                if report.is_partial() {
                    writeln!(
                        out,
                        "Optimization stopped early: {} files left in place.",
                        report.skipped
                    )?;
                } else {
                    writeln!(
                        out,
                        "Optimization completed ({} files relocated, {} deleted files reclaimed).",
                        report.relocated, report.reclaimed
                    )?;
                }
            }
            Command::Info => {
                let superblock = fs.superblock();
                let geometry = superblock.geometry;
                writeln!(out, "Version:    {}", superblock.version)?;
                writeln!(out, "Block size: {}", geometry.block_size)?;
                writeln!(out, "Blocks:     {}", geometry.block_count)?;
                writeln!(out, "File slots: {}", geometry.max_files)?;
                writeln!(out, "Capacity:   {}", pretty_size_from_bytes(geometry.capacity_bytes()))?;
                writeln!(out, "Created:    {}", superblock.created_at)?;
            }
        }
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geometry;
    use crate::ops::tests::new_fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn session(dir: &TempDir, input: &str) -> String {
        let mut shell = Shell::new(new_fs(dir, Geometry::new(512, 64, 4)));
        let mut out = Vec::new();
        shell.run(Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("create a.txt").unwrap(), Command::Create("a.txt".to_string()));
        assert_eq!(Command::parse("  read  a \n").unwrap(), Command::Read("a".to_string()));
        assert_eq!(Command::parse("showbitmap").unwrap(), Command::ShowBitmap);
        assert_eq!(Command::parse("").unwrap(), Command::Empty);
        assert_eq!(
            Command::parse("frobnicate").unwrap_err(),
            CommandError::Unknown("frobnicate".to_string())
        );
        assert_eq!(Command::parse("delete").unwrap_err(), CommandError::MissingName("delete"));
    }

    #[test]
    fn parse_write_keeps_spacing() {
        assert_eq!(
            Command::parse("write a hello  world ").unwrap(),
            Command::Write { name: "a".to_string(), data: "hello  world ".to_string() }
        );
        assert_eq!(
            Command::parse("write a").unwrap(),
            Command::Write { name: "a".to_string(), data: String::new() }
        );
        assert_eq!(Command::parse("write").unwrap_err(), CommandError::MissingName("write"));
    }

    #[test]
    fn session_round_trip() {
        let dir = TempDir::new().unwrap();
        let output = session(
            &dir,
            "create a\nwrite a hello there\nread a\nlist\nshowbitmap\nexit\ncreate b\n",
        );

        assert!(output.contains("Created file 'a'."));
        assert!(output.contains("Wrote 11 bytes to 'a'."));
        assert!(output.contains("----- content of 'a' (11 bytes) -----\nhello there\n"));
        assert!(output.contains("0   a"));
        assert!(output.contains("Blocks: 64, Used: 1, Free: 63"));
        // nothing after exit runs
        assert!(!output.contains("'b'"));
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let dir = TempDir::new().unwrap();
        let output = session(&dir, "read nope\nbogus\ncreate a\ndelete a\nread a\ndelete a\n");

        assert!(output.contains("Error: File 'nope' not found"));
        assert!(output.contains("Unknown command 'bogus'"));
        assert!(output.contains("File 'a' marked deleted."));
        assert!(output.contains("Error: File 'a' is deleted"));
        assert!(output.contains("Error: File 'a' is already deleted"));
    }

    #[test]
    fn maintenance_commands() {
        let dir = TempDir::new().unwrap();
        let output = session(&dir, "create a\nwrite a x\ninit\nlist\nrecover\noptimize\ninfo\n");

        assert!(output.contains("Filesystem initialized (32768 bytes)."));
        assert!(output.contains("Recovery completed (0 records applied, 0 skipped)."));
        assert!(output
            .contains("Optimization completed (0 files relocated, 0 deleted files reclaimed)."));
        assert!(output.contains("Capacity:   32.00 KB"));
        assert!(!output.contains("0   a"));
    }
}
