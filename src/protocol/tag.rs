//! Line markers and the encode/decode pair.
//!
//! | Marker                | Meaning                               |
//! |-----------------------|---------------------------------------|
//! | `[PRIORITY_<probe>]`  | identity probe output (`uname`, `whoami`) |
//! | `[PRIORITY:1]`        | operator priority task output         |
//! | `[PRIORITY:0]`        | noise command output                  |
//! | *(anything else)*     | untagged; ignored by the read loop    |

use std::fmt::{Display, Formatter};

use crate::models::endpoint::IdentityField;

const PRIORITY_MARKER: &str = "[PRIORITY:1]";
const NOISE_MARKER: &str = "[PRIORITY:0]";
const PROBE_PREFIX: &str = "[PRIORITY_";

/// Fixed identity probe sent at the start of every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// `uname -a`, resolved into [`IdentityField::Uname`].
    Uname,
    /// `whoami`, resolved into [`IdentityField::User`].
    Whoami,
}

impl Probe {
    /// Probes in the order they are sent.
    pub const ALL: [Self; 2] = [Self::Uname, Self::Whoami];

    /// Name carried inside the `[PRIORITY_<name>]` marker.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Uname => "uname",
            Self::Whoami => "whoami",
        }
    }

    /// Shell command executed on the remote.
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::Uname => "uname -a",
            Self::Whoami => "whoami",
        }
    }

    /// Endpoint field updated with this probe's output.
    #[must_use]
    pub fn field(self) -> IdentityField {
        match self {
            Self::Uname => IdentityField::Uname,
            Self::Whoami => IdentityField::User,
        }
    }

    /// Look up a probe by its marker name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|probe| probe.name() == name)
    }
}

/// Class assigned to an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Background catalog command.
    Noise,
    /// Operator-submitted task.
    Priority,
    /// Identity probe.
    Probe(Probe),
}

impl Tag {
    /// Literal marker the remote prefixes to every output line.
    #[must_use]
    pub fn marker(self) -> String {
        match self {
            Self::Noise => NOISE_MARKER.to_owned(),
            Self::Priority => PRIORITY_MARKER.to_owned(),
            Self::Probe(probe) => format!("{PROBE_PREFIX}{}]", probe.name()),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.marker())
    }
}

/// Classification of one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTag {
    /// No recognised marker.
    None,
    /// Output of a noise command.
    Noise,
    /// Output of a priority task.
    Priority,
    /// Output of the named identity probe. The name is not validated here.
    Probe(String),
}

/// One inbound line with its marker removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLine {
    /// Detected class.
    pub tag: LineTag,
    /// Line content after the marker and its separating space; the whole
    /// line when untagged.
    pub body: String,
}

impl TaggedLine {
    fn untagged(line: &str) -> Self {
        Self {
            tag: LineTag::None,
            body: line.to_owned(),
        }
    }
}

/// Wrap `command` so the remote shell tags each output line with `tag`.
///
/// Produces `eval '<command>' 2>&1 | awk '{print "<marker> " $0}'` plus a
/// newline. The command travels as one single-quoted word, so its own
/// syntax (a trailing `&`, a `#` comment, a stray `;`) cannot leak into the
/// wrapper or into later lines. A command without embedded newlines
/// encodes to exactly one line.
#[must_use]
pub fn encode(command: &str, tag: Tag) -> String {
    format!(
        "eval {} 2>&1 | awk '{{print \"{marker} \" $0}}'\n",
        single_quote(command.trim_end()),
        marker = tag.marker()
    )
}

/// POSIX single-quoting: each `'` becomes `'\''`.
fn single_quote(raw: &str) -> String {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for ch in raw.chars() {
        if ch == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Classify one inbound line (without its terminating newline).
#[must_use]
pub fn decode(line: &str) -> TaggedLine {
    if let Some(body) = strip_marker(line, PRIORITY_MARKER) {
        return TaggedLine {
            tag: LineTag::Priority,
            body: body.to_owned(),
        };
    }

    if let Some(body) = strip_marker(line, NOISE_MARKER) {
        return TaggedLine {
            tag: LineTag::Noise,
            body: body.to_owned(),
        };
    }

    if let Some(rest) = line.strip_prefix(PROBE_PREFIX) {
        let (token, body) = rest.split_once(' ').unwrap_or((rest, ""));
        if let Some(name) = token.strip_suffix(']') {
            return TaggedLine {
                tag: LineTag::Probe(name.to_owned()),
                body: body.to_owned(),
            };
        }
    }

    TaggedLine::untagged(line)
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.strip_prefix(marker)?.strip_prefix(' ')
}
