use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::ptr::null_mut;
use std::str::FromStr;
use std::sync::atomic::{AtomicPtr, Ordering};

pub struct DiagnosticsConfig {
    pub namespace: &'static str,
    pub level: LogLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum LogLevel {
    Notice,
    Warn,
    Impossible,
    None,
}

impl LogLevel {
    fn get_prefix_formatting(self) -> &'static str {
        match self {
            Self::Notice => "",
            Self::Warn => "\x1b[33m",
            Self::Impossible => "\x1b[31m",
            Self::None => unreachable!(),
        }
    }

    fn get_prefix_text(self) -> &'static str {
        match self {
            Self::Notice | Self::Warn => "",
            Self::Impossible => {
                "sigposture has observed the OS rejecting a signal operation on a signal set it \
                 built itself. The posture of this process is now unknown. Please report this as \
                 a bug together with the OS and libc versions. The error is:\n\n"
            }
            Self::None => unreachable!(),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notice" => Ok(Self::Notice),
            "warn" => Ok(Self::Warn),
            "impossible" => Ok(Self::Impossible),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown log level {s}")),
        }
    }
}

static DIAGNOSTICS_CONFIG: AtomicPtr<DiagnosticsConfig> = AtomicPtr::new(null_mut());

#[macro_export]
macro_rules! log_level {
    (notice) => {
        $crate::log::LogLevel::Notice
    };
    (warn) => {
        $crate::log::LogLevel::Warn
    };
    (impossible) => {
        $crate::log::LogLevel::Impossible
    };
}

#[macro_export]
macro_rules! log {
    ($format:literal $($rest:tt)*) => {
        $crate::log!(notice, $format $($rest)*);
    };
    ($level:ident, $($args:tt)*) => {
        $crate::log::do_log(
            $crate::log_level!($level),
            file!(),
            || format!($($args)*),
        );
    };
}

pub fn enable_diagnostics(namespace: &'static str, level: LogLevel) {
    let config = Box::leak(Box::new(DiagnosticsConfig { namespace, level }));
    DIAGNOSTICS_CONFIG.store(config as *mut _, Ordering::Release);
}

static COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),
    (255, 85, 0),
    (255, 170, 0),
    (255, 255, 0),
    (170, 255, 0),
    (0, 255, 85),
    (0, 255, 213),
    (0, 170, 255),
    (127, 0, 255),
    (212, 0, 255),
    (255, 0, 170),
    (255, 0, 85),
];

pub fn do_log(level: LogLevel, file: &'static str, args: impl FnOnce() -> String) {
    // Library users that never enabled diagnostics get no output at all
    let Some(config) = get_diagnostics_config() else {
        return;
    };
    if level < config.level || level == LogLevel::None {
        return;
    }

    let context = format!("{}:{}", config.namespace, module_of(file));
    let (r, g, b) = color_of(&context);
    let text = word_wrap(&format!("{}{}", level.get_prefix_text(), args()));

    // A failed write is dropped: the caller may be halfway through restoring a signal posture
    let _ = writeln!(
        std::io::stderr(),
        "\x1b[38;2;{r};{g};{b}m[{context:18}]\x1b[0m {}{text}\x1b[0m",
        level.get_prefix_formatting(),
    );
}

// "src/posix/controller.rs" -> "controller"
fn module_of(file: &str) -> &str {
    let stem = file.strip_suffix(".rs").unwrap_or(file);
    stem.rsplit('/').next().unwrap_or(stem)
}

fn color_of(context: &str) -> (u8, u8, u8) {
    let mut hasher = DefaultHasher::new();
    context.hash(&mut hasher);
    COLORS[hasher.finish() as usize % COLORS.len()]
}

pub fn get_diagnostics_config() -> Option<&'static DiagnosticsConfig> {
    // The pointer is either null or a leaked, never freed Box
    unsafe { DIAGNOSTICS_CONFIG.load(Ordering::Acquire).as_ref() }
}

fn word_wrap(text: &str) -> String {
    const WIDTH: usize = 100;
    const INDENT: &str = "\n                     ";
    text.split('\n')
        .map(|line| {
            let mut wrapped = String::new();
            let mut width = 0;
            for word in line.split_whitespace() {
                if width > 0 && width + 1 + word.len() > WIDTH {
                    wrapped.push_str(INDENT);
                    width = 0;
                } else if width > 0 {
                    wrapped.push(' ');
                    width += 1;
                }
                wrapped.push_str(word);
                width += word.len();
            }
            wrapped
        })
        .collect::<Vec<_>>()
        .join(INDENT)
}
