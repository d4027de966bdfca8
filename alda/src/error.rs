use std::io;
use thiserror::Error;

const ISSUES_URL: &str = "https://github.com/alda-lang/alda/issues/new";

/// Errors that are presented to the user in a specific way. Any other error that reaches `main` is
/// presented as unexpected, with a link for filing an issue.
#[derive(Error, Debug)]
pub enum AldaError {
    #[error("{0}")]
    User(String),
    #[error("{rendered}")]
    Source {
        line: usize,
        column: usize,
        rendered: String,
    },
    #[error(
        "It looks like alda-player isn't installed. Install it in the same directory as alda, \
         or anywhere on your PATH.\n\nTo check your installation, run:\n\n  alda doctor"
    )]
    PlayerNotInstalled,
    #[error(
        "Alda couldn't find an available player process.\n\n\
         Troubleshooting:\n\
         \x20 * Run `alda doctor` to check for problems.\n\
         \x20 * Run `alda ps` to see which players are running.\n\
         \x20 * Look for errors in the player log: {log_path}\n\
         \x20 * Start a player in the foreground with `alda-player -v run -p 27278`, then in \
         another terminal run `alda -v2 play -p 27278 -c \"piano: c12 e g > c4\"`"
    )]
    NoPlayersAvailable { log_path: String },
    #[error("failed to send a message to the player on port {port}: {source}")]
    Transport {
        port: u16,
        #[source]
        source: io::Error,
    },
}

impl AldaError {
    pub fn user(msg: impl Into<String>) -> anyhow::Error {
        AldaError::User(msg.into()).into()
    }
}

/// Format an error the way the command-line tool prints it.
pub fn present(e: &anyhow::Error) -> String {
    let oops = |e: &dyn std::fmt::Display| {
        format!(
            "Oops! Something went wrong:\n\n{e}\n\nThis might be a bug. For help, consider \
             filing an issue at:\n{ISSUES_URL}"
        )
    };
    match e.downcast_ref::<AldaError>() {
        Some(e) => e.to_string(),
        None => oops(&format!("{e:#}")),
    }
}

/// True if the error means the player we were talking to can't be reached.
pub fn is_transport(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<AldaError>(), Some(AldaError::Transport { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present() {
        let e = AldaError::user("no such file: potato.alda");
        assert_eq!(present(&e), "no such file: potato.alda");

        let e = anyhow::anyhow!("it broke");
        let shown = present(&e);
        assert!(shown.starts_with("Oops! Something went wrong:\n\nit broke"));
        assert!(shown.ends_with(ISSUES_URL));
        // Context added on the way out is kept.
        let e = anyhow::anyhow!("disk full").context("writing out.mid");
        assert!(present(&e).contains("writing out.mid: disk full"));

        let e: anyhow::Error = AldaError::Transport {
            port: 27278,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
        .into();
        assert!(is_transport(&e));
        assert!(present(&e).contains("port 27278"));
        assert!(!is_transport(&AldaError::PlayerNotInstalled.into()));
    }
}
