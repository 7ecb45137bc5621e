use argh::FromArgs;

#[derive(FromArgs)]
/// Inspect or prepare the signal posture of server master and worker processes
pub struct CLIArgs {
    /// diagnostics level: notice, warn, impossible or none (default: $SIGPOSTURE_LOG, then none)
    #[argh(option)]
    pub log_level: Option<String>,

    #[argh(subcommand)]
    pub command: CLICommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum CLICommand {
    Show(CLIShowCommand),
    Exec(CLIExecCommand),
}

#[derive(FromArgs)]
/// Print blocked, ignored and handled signals of this process
#[argh(subcommand, name = "show")]
pub struct CLIShowCommand {
    /// print a JSON object instead of text
    #[argh(switch)]
    pub json: bool,
}

#[derive(FromArgs)]
/// Apply the ignore set of a role, then execute a program with that posture
#[argh(subcommand, name = "exec")]
pub struct CLIExecCommand {
    /// master or worker
    #[argh(option)]
    pub role: String,

    /// keep every signal blocked in the executed program
    #[argh(switch)]
    pub block_all: bool,

    /// program and its arguments, usually after --
    #[argh(positional)]
    pub argv: Vec<String>,
}

#[cfg(unix)]
pub fn main() {
    let cli_args: CLIArgs = argh::from_env();
    if let Err(e) = crate::posix::entry::main(cli_args) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}
