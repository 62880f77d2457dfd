//! Host control surface
//!
//! Parses the argument list of a privileged host command
//! (`enable doors`, `disable`, `stop`, `start`, ...).

/// A privileged command from the channel owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Enable everything, a group, or a command
    Enable(Option<String>),
    /// Disable everything, a group, or a command
    Disable(Option<String>),
    /// Disable everything and reset the plugin
    Stop,
    /// Disable everything, then enable the enabled-on-start commands
    Start,
}

/// Resolved target of an enable/disable
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    All,
    Group(String),
    Command(String),
}

impl HostCommand {
    /// Parse whitespace-split arguments; unknown verbs yield `None`
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let (verb, rest) = args.split_first()?;
        let target = rest.first().map(|target| target.as_ref().to_string());
        match verb.as_ref() {
            "enable" | "on" => Some(HostCommand::Enable(target)),
            "disable" | "off" => Some(HostCommand::Disable(target)),
            "stop" | "reset" => Some(HostCommand::Stop),
            "start" => Some(HostCommand::Start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbs() {
        assert_eq!(
            HostCommand::parse(&["enable", "doors"]),
            Some(HostCommand::Enable(Some("doors".into())))
        );
        assert_eq!(HostCommand::parse(&["off"]), Some(HostCommand::Disable(None)));
        assert_eq!(HostCommand::parse(&["reset"]), Some(HostCommand::Stop));
        assert_eq!(HostCommand::parse(&["start", "ignored"]), Some(HostCommand::Start));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(HostCommand::parse(&["dance"]), None);
        assert_eq!(HostCommand::parse::<&str>(&[]), None);
    }
}
