//! Shell command parsing.
//!
//! Every input line maps to exactly one [`ShellCommand`]. Unknown words
//! become [`ShellCommand::Unrecognized`] and missing arguments become
//! [`ShellCommand::Usage`], so dispatch is a single total `match`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    List(Option<String>),
    Cd(String),
    Pwd,
    Mkdir(String),
    Rmdir(String),
    Delete(String),
    Rename { from: String, to: String },
    Get { remote: String, local: Option<String> },
    Put { local: String, remote: Option<String> },
    Mget(Vec<String>),
    Mput(Vec<String>),
    Open { host: Option<String>, port: Option<u16> },
    Close,
    Ascii,
    Binary,
    Passive,
    Status,
    Prompt,
    Help,
    Quit,
    Unrecognized(String),
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  ls, dir [path]             list remote directory
  cd, cwd <dir>              change remote directory
  pwd                        print remote directory
  mkdir <dir>                create remote directory
  rmdir <dir>                remove remote directory
  delete, del <file>         delete remote file
  rename <from> <to>         rename remote file
  get, recv <remote> [local] download a file
  put, send <local> [remote] scan, then upload a file
  mget <pattern>...          download matching files
  mput <pattern>...          scan and upload matching files
  open [host] [port]         connect and log in
  close                      disconnect
  ascii | binary             set transfer type
  passive                    toggle passive/active data connections
  prompt                     toggle per-file prompts for mget/mput
  status                     show session state
  help, ?                    this text
  quit, bye, exit            leave";

/// Parses one input line.
pub fn parse(line: &str) -> ShellCommand {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return ShellCommand::Empty;
    };
    let args: Vec<String> = words.map(str::to_string).collect();
    let arg = |i: usize| args.get(i).cloned();

    match word.to_ascii_lowercase().as_str() {
        "ls" | "dir" => ShellCommand::List(arg(0)),
        "cd" | "cwd" => match arg(0) {
            Some(dir) => ShellCommand::Cd(dir),
            None => ShellCommand::Usage("cd <directory>"),
        },
        "pwd" => ShellCommand::Pwd,
        "mkdir" => match arg(0) {
            Some(dir) => ShellCommand::Mkdir(dir),
            None => ShellCommand::Usage("mkdir <directory>"),
        },
        "rmdir" => match arg(0) {
            Some(dir) => ShellCommand::Rmdir(dir),
            None => ShellCommand::Usage("rmdir <directory>"),
        },
        "delete" | "del" => match arg(0) {
            Some(name) => ShellCommand::Delete(name),
            None => ShellCommand::Usage("delete <file>"),
        },
        "rename" => match (arg(0), arg(1)) {
            (Some(from), Some(to)) => ShellCommand::Rename { from, to },
            _ => ShellCommand::Usage("rename <from> <to>"),
        },
        "get" | "recv" => match arg(0) {
            Some(remote) => ShellCommand::Get {
                remote,
                local: arg(1),
            },
            None => ShellCommand::Usage("get <remote-file> [local-file]"),
        },
        "put" | "send" => match arg(0) {
            Some(local) => ShellCommand::Put {
                local,
                remote: arg(1),
            },
            None => ShellCommand::Usage("put <local-file> [remote-file]"),
        },
        "mget" if !args.is_empty() => ShellCommand::Mget(args),
        "mget" => ShellCommand::Usage("mget <pattern>..."),
        "mput" if !args.is_empty() => ShellCommand::Mput(args),
        "mput" => ShellCommand::Usage("mput <pattern>..."),
        "open" => match arg(1).map(|p| p.parse::<u16>()) {
            Some(Err(_)) | Some(Ok(0)) => ShellCommand::Usage("open [host] [port]"),
            port => ShellCommand::Open {
                host: arg(0),
                port: port.and_then(Result::ok),
            },
        },
        "close" => ShellCommand::Close,
        "ascii" => ShellCommand::Ascii,
        "binary" => ShellCommand::Binary,
        "passive" => ShellCommand::Passive,
        "status" => ShellCommand::Status,
        "prompt" => ShellCommand::Prompt,
        "help" | "?" => ShellCommand::Help,
        "quit" | "bye" | "exit" => ShellCommand::Quit,
        _ => ShellCommand::Unrecognized(word.to_string()),
    }
}
