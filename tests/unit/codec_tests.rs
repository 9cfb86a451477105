//! Unit tests for `TaggedLineCodec` line reassembly.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use noise_generator::protocol::codec::TaggedLineCodec;

#[test]
fn complete_line_is_returned_without_newline() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from("[PRIORITY_whoami] root\n");

    let line = codec.decode(&mut buf).expect("decode");
    assert_eq!(line.as_deref(), Some("[PRIORITY_whoami] root"));
    assert!(buf.is_empty());
}

#[test]
fn partial_fragment_is_buffered_until_newline() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from("[PRIORITY_wh");

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"oami] ro");
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"ot\n[PRIORITY:1] ne");
    assert_eq!(
        codec.decode(&mut buf).expect("decode").as_deref(),
        Some("[PRIORITY_whoami] root")
    );
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"xt\n");
    assert_eq!(
        codec.decode(&mut buf).expect("decode").as_deref(),
        Some("[PRIORITY:1] next")
    );
}

#[test]
fn several_lines_in_one_read_are_split() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from("a\nb\n\nc\n");

    let mut lines = Vec::new();
    while let Some(line) = codec.decode(&mut buf).expect("decode") {
        lines.push(line);
    }
    assert_eq!(lines, vec!["a", "b", "", "c"]);
}

#[test]
fn carriage_return_is_stripped() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from("[PRIORITY:1] total 0\r\n");

    assert_eq!(
        codec.decode(&mut buf).expect("decode").as_deref(),
        Some("[PRIORITY:1] total 0")
    );
}

#[test]
fn invalid_utf8_is_replaced_not_rejected() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from(&b"[PRIORITY:1] caf\xff\n"[..]);

    let line = codec.decode(&mut buf).expect("decode").expect("line");
    assert_eq!(line, "[PRIORITY:1] caf\u{fffd}");
}

#[test]
fn oversized_line_is_discarded_and_following_line_survives() {
    let mut codec = TaggedLineCodec::with_max_length(8);
    let mut buf = BytesMut::from("0123456789abcdef");

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    assert!(buf.is_empty(), "oversized prefix must be dropped");

    buf.extend_from_slice(b"tail of long line\nok\n");
    assert_eq!(codec.decode(&mut buf).expect("decode").as_deref(), Some("ok"));
}

#[test]
fn oversized_line_with_newline_in_same_read_is_discarded() {
    let mut codec = TaggedLineCodec::with_max_length(4);
    let mut buf = BytesMut::from("too long\nfine\n");

    assert_eq!(codec.decode(&mut buf).expect("decode").as_deref(), Some("fine"));
}

#[test]
fn trailing_fragment_is_emitted_at_eof() {
    let mut codec = TaggedLineCodec::new();
    let mut buf = BytesMut::from("first\n[PRIORITY:1] last");

    assert_eq!(codec.decode_eof(&mut buf).expect("eof").as_deref(), Some("first"));
    assert_eq!(
        codec.decode_eof(&mut buf).expect("eof").as_deref(),
        Some("[PRIORITY:1] last")
    );
    assert_eq!(codec.decode_eof(&mut buf).expect("eof"), None);
}
