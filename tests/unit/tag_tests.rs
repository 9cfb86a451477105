//! Unit tests for tag encoding and line classification.

use noise_generator::protocol::{decode, encode, LineTag, Probe, Tag};

fn expected_line_tag(tag: Tag) -> LineTag {
    match tag {
        Tag::Noise => LineTag::Noise,
        Tag::Priority => LineTag::Priority,
        Tag::Probe(probe) => LineTag::Probe(probe.name().to_owned()),
    }
}

fn all_tags() -> Vec<Tag> {
    let mut tags = vec![Tag::Noise, Tag::Priority];
    tags.extend(Probe::ALL.into_iter().map(Tag::Probe));
    tags
}

#[test]
fn markers_match_wire_convention() {
    assert_eq!(Tag::Noise.marker(), "[PRIORITY:0]");
    assert_eq!(Tag::Priority.marker(), "[PRIORITY:1]");
    assert_eq!(Tag::Probe(Probe::Uname).marker(), "[PRIORITY_uname]");
    assert_eq!(Tag::Probe(Probe::Whoami).marker(), "[PRIORITY_whoami]");
}

#[test]
fn encode_wraps_command_for_remote_tagging() {
    assert_eq!(
        encode("id", Tag::Priority),
        "eval 'id' 2>&1 | awk '{print \"[PRIORITY:1] \" $0}'\n"
    );
    assert_eq!(
        encode("uname -a", Tag::Probe(Probe::Uname)),
        "eval 'uname -a' 2>&1 | awk '{print \"[PRIORITY_uname] \" $0}'\n"
    );
}

#[test]
fn encoded_command_is_a_single_line() {
    for tag in all_tags() {
        let wire = encode("echo 'a' \"b\" & # trailing comment", tag);
        assert!(wire.ends_with('\n'));
        assert_eq!(wire.matches('\n').count(), 1, "{wire:?}");
    }
}

#[test]
fn remote_output_decodes_back_to_its_tag_and_body() {
    let outputs = ["", "root", "Linux box1 5.15", "  leading spaces", "[PRIORITY:1] nested"];
    for tag in all_tags() {
        for output in outputs {
            let line = format!("{} {output}", tag.marker());
            let decoded = decode(&line);
            assert_eq!(decoded.tag, expected_line_tag(tag), "{line:?}");
            assert_eq!(decoded.body, output, "{line:?}");
        }
    }
}

#[test]
fn probe_line_yields_name_and_body() {
    let decoded = decode("[PRIORITY_uname] Linux box1 5.15");
    assert_eq!(decoded.tag, LineTag::Probe("uname".into()));
    assert_eq!(decoded.body, "Linux box1 5.15");
}

#[test]
fn unknown_probe_names_are_still_classified_as_probes() {
    let decoded = decode("[PRIORITY_hostname] box1");
    assert_eq!(decoded.tag, LineTag::Probe("hostname".into()));
    assert_eq!(decoded.body, "box1");
}

#[test]
fn probe_marker_without_body_has_empty_body() {
    let decoded = decode("[PRIORITY_whoami]");
    assert_eq!(decoded.tag, LineTag::Probe("whoami".into()));
    assert_eq!(decoded.body, "");
}

#[test]
fn unclosed_probe_marker_is_untagged() {
    let decoded = decode("[PRIORITY_whoami root");
    assert_eq!(decoded.tag, LineTag::None);
    assert_eq!(decoded.body, "[PRIORITY_whoami root");
}

#[test]
fn unrelated_lines_are_untagged() {
    for line in ["", "bash: no job control", "PRIORITY:1 x", " [PRIORITY:1] x"] {
        let decoded = decode(line);
        assert_eq!(decoded.tag, LineTag::None, "{line:?}");
        assert_eq!(decoded.body, line);
    }
}

#[test]
fn probes_map_to_fixed_identity_fields() {
    use noise_generator::models::endpoint::IdentityField;

    assert_eq!(Probe::Uname.field(), IdentityField::Uname);
    assert_eq!(Probe::Whoami.field(), IdentityField::User);
    assert_eq!(Probe::Uname.command(), "uname -a");
    assert_eq!(Probe::Whoami.command(), "whoami");
}

/// Run the encoded line through a real shell and decode what comes back.
#[cfg(unix)]
#[tokio::test]
async fn shell_output_round_trips_through_encode_and_decode() {
    let command = "printf 'alpha\\nbeta gamma\\n'";

    for tag in all_tags() {
        let wire = encode(command, tag);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&wire)
            .output()
            .await
            .expect("run sh");
        assert!(output.status.success(), "{wire}");

        let stdout = String::from_utf8(output.stdout).expect("utf8");
        let decoded: Vec<_> = stdout.lines().map(decode).collect();
        assert_eq!(decoded.len(), 2, "{stdout:?}");
        assert!(decoded.iter().all(|line| line.tag == expected_line_tag(tag)));
        assert_eq!(decoded[0].body, "alpha");
        assert_eq!(decoded[1].body, "beta gamma");
    }
}

#[cfg(unix)]
async fn run_sh(script: &str) -> Vec<(LineTag, String)> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut child = Command::new("sh")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .expect("spawn sh");
    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(script.as_bytes()).await.expect("write script");
    drop(stdin);

    let output = tokio::time::timeout(std::time::Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("sh timed out")
        .expect("wait sh");
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    stdout
        .lines()
        .map(|line| {
            let tagged = decode(line);
            (tagged.tag, tagged.body)
        })
        .collect()
}

/// Commands whose own syntax would break a naive wrapper still run and tag.
#[cfg(unix)]
#[tokio::test]
async fn awkward_commands_survive_the_wrapper() {
    let cases: [(&str, &[&str]); 8] = [
        ("echo hi &", &["hi"]),
        ("echo hi # note", &["hi"]),
        ("echo hi;", &["hi"]),
        ("echo hi ;  ", &["hi"]),
        ("echo 'single' \"double\"", &["single double"]),
        ("echo \"it's\"", &["it's"]),
        ("echo one\necho two", &["one", "two"]),
        ("echo oops >&2", &["oops"]),
    ];

    for (command, expected) in cases {
        let got = run_sh(&encode(command, Tag::Priority)).await;
        let want: Vec<_> = expected
            .iter()
            .map(|body| (LineTag::Priority, (*body).to_owned()))
            .collect();
        assert_eq!(got, want, "{command:?}");
    }
}

/// A broken task must not swallow the commands sent after it.
#[cfg(unix)]
#[tokio::test]
async fn later_commands_still_run_after_awkward_ones() {
    let script = [
        encode("echo first # trailing comment", Tag::Priority),
        encode("echo 'unterminated", Tag::Priority),
        encode("echo bg &", Tag::Priority),
        encode("echo noise", Tag::Noise),
    ]
    .concat();

    let got = run_sh(&script).await;
    assert!(got.contains(&(LineTag::Priority, "first".to_owned())), "{got:?}");
    assert!(got.contains(&(LineTag::Priority, "bg".to_owned())), "{got:?}");
    assert_eq!(got.last(), Some(&(LineTag::Noise, "noise".to_owned())), "{got:?}");
}
