use crate::{
    entry, log,
    log::LogLevel,
    posix::{
        controller::{Controller, SignalControl},
        roles::{self, Role},
        system::{self, Disposition},
    },
};
use anyhow::{Context, Result, anyhow, ensure};
use miniserde::{Serialize, json};
use nix::{sys::signal::Signal, unistd};
use std::convert::Infallible;
use std::ffi::CString;

pub fn main(cli_args: entry::CLIArgs) -> Result<()> {
    let log_level = cli_args
        .log_level
        .or_else(|| std::env::var("SIGPOSTURE_LOG").ok());
    let log_level: LogLevel = log_level
        .as_deref()
        .unwrap_or("none")
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    log::enable_diagnostics("sigposture", log_level);

    let controller = Controller::new();

    match cli_args.command {
        entry::CLICommand::Show(command) => {
            let posture = Posture::capture(&controller)?;
            if command.json {
                println!("{}", json::to_string(&posture));
            } else {
                print!("{}", posture.to_text());
            }
        }
        entry::CLICommand::Exec(command) => {
            let role: Role = command.role.parse().map_err(|e: String| anyhow!(e))?;
            match exec(&controller, role, command.block_all, &command.argv)? {}
        }
    }

    Ok(())
}

fn exec(
    controller: &Controller,
    role: Role,
    block_all: bool,
    argv: &[String],
) -> Result<Infallible> {
    ensure!(!argv.is_empty(), "No program to execute");
    let argv = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("Argument contains a NUL byte")?;

    // Ignored dispositions and the mask both survive execve
    let previous_mask = controller.current_mask()?;
    let dispositions = controller
        .save_and_set_role_ignore(role)
        .context("Failed to prepare role posture")?;
    let masked = if block_all {
        controller.block_all(None)
    } else {
        controller.unblock_all()
    };

    let e = match masked {
        Ok(()) => {
            log!("Executing {:?} as {role}", argv[0]);
            match unistd::execvp(&argv[0], &argv) {
                Ok(never) => match never {},
                Err(e) => anyhow::Error::new(e).context(format!("Failed to execute {:?}", argv[0])),
            }
        }
        Err(e) => e,
    };

    // Still running, so hand the caller back the posture it had
    if let Err(restore_error) = controller.set_mask(&previous_mask) {
        log!(impossible, "{restore_error:?}");
    }
    if let Err(restore_error) = dispositions.restore() {
        log!(impossible, "{restore_error:?}");
    }
    Err(e)
}

#[derive(Serialize)]
struct SignalEntry {
    name: String,
    number: i32,
    meaning: Option<String>,
}

#[derive(Serialize)]
struct Posture {
    blocked: Vec<SignalEntry>,
    ignored: Vec<SignalEntry>,
    handled: Vec<SignalEntry>,
}

impl SignalEntry {
    fn new(signal: Signal) -> Self {
        Self {
            name: signal.as_str().to_string(),
            number: signal as i32,
            meaning: roles::operational_name(signal).map(str::to_string),
        }
    }
}

impl Posture {
    fn capture(controller: &Controller) -> Result<Self> {
        let mask = controller.current_mask()?;
        let mut posture = Self {
            blocked: Vec::new(),
            ignored: Vec::new(),
            handled: Vec::new(),
        };
        for signal in Signal::iterator() {
            if mask.contains(signal) {
                posture.blocked.push(SignalEntry::new(signal));
            }
            match system::disposition(signal)
                .with_context(|| format!("Failed to read disposition of {signal}"))?
            {
                Disposition::Default => {}
                Disposition::Ignore => posture.ignored.push(SignalEntry::new(signal)),
                Disposition::Handler => posture.handled.push(SignalEntry::new(signal)),
            }
        }
        Ok(posture)
    }

    fn to_text(&self) -> String {
        let mut text = String::new();
        for (title, entries) in [
            ("blocked", &self.blocked),
            ("ignored", &self.ignored),
            ("handled", &self.handled),
        ] {
            let names: Vec<String> = entries
                .iter()
                .map(|entry| match &entry.meaning {
                    Some(meaning) => format!("{} ({meaning})", entry.name),
                    None => entry.name.clone(),
                })
                .collect();
            let names = if names.is_empty() {
                "-".to_string()
            } else {
                names.join(", ")
            };
            text.push_str(&format!("{title}: {names}\n"));
        }
        text
    }
}
