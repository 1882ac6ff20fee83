//! Unit tests for the output parsers
//!
//! Covers both interactive passthrough and the `codex exec --json` event stream

use kodegen_codex_session::OutputStream;
use kodegen_codex_session::message::{
    CodexEvent, InteractiveParser, LineSplitter, OutputParser, ParserEvent, StructuredParser,
    parser_for,
};
use kodegen_codex_session::SessionMode;

fn assistant(text: &str) -> ParserEvent {
    ParserEvent::Assistant(text.to_string())
}

fn diagnostic(text: &str) -> ParserEvent {
    ParserEvent::Diagnostic(text.to_string())
}

#[test]
fn test_parse_thread_started() {
    let event = CodexEvent::parse_line(r#"{"type":"thread.started","thread_id":"abc-123"}"#)
        .expect("valid event");
    assert_eq!(event.kind, "thread.started");
    assert_eq!(event.thread_id.as_deref(), Some("abc-123"));
}

#[test]
fn test_parse_rejects_non_objects() {
    assert!(CodexEvent::parse_line("not json").is_none());
    assert!(CodexEvent::parse_line("[1,2,3]").is_none());
    assert!(CodexEvent::parse_line("42").is_none());
}

#[test]
fn test_parse_tolerates_odd_field_types() {
    let event = CodexEvent::parse_line(r#"{"type":7,"item":"x"}"#).expect("still an object");
    assert!(event.kind.is_empty());
    assert!(event.item.is_none());
}

#[test]
fn test_structured_session_and_messages() {
    let mut parser = StructuredParser::new(false);
    let events = parser.push(
        OutputStream::Stdout,
        concat!(
            r#"{"type":"thread.started","thread_id":"th_9"}"#,
            "\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","text":"  Hello  "}}"#,
            "\n",
        ),
    );
    assert_eq!(
        events,
        vec![ParserEvent::SessionStarted("th_9".into()), assistant("Hello")]
    );
}

#[test]
fn test_structured_line_split_across_chunks() {
    let mut parser = StructuredParser::new(false);
    let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"split"}}"#;
    let (head, tail) = line.split_at(20);

    assert!(parser.push(OutputStream::Stdout, head).is_empty());
    assert_eq!(
        parser.push(OutputStream::Stdout, &format!("{tail}\r\n")),
        vec![assistant("split")]
    );
}

#[test]
fn test_structured_unterminated_line_flushed_on_finish() {
    let mut parser = StructuredParser::new(false);
    let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"last"}}"#;
    assert!(parser.push(OutputStream::Stdout, line).is_empty());
    assert_eq!(parser.finish(), vec![assistant("last")]);
}

#[test]
fn test_structured_reasoning_toggle() {
    let line = "{\"type\":\"item.completed\",\"item\":{\"type\":\"reasoning\",\"text\":\"hmm\"}}\n";

    let mut hidden = StructuredParser::new(false);
    assert!(hidden.push(OutputStream::Stdout, line).is_empty());

    let mut shown = StructuredParser::new(true);
    assert_eq!(shown.push(OutputStream::Stdout, line), vec![assistant("hmm")]);
}

#[test]
fn test_structured_other_items_become_diagnostics() {
    let mut parser = StructuredParser::new(false);
    let events = parser.push(
        OutputStream::Stdout,
        concat!(
            r#"{"type":"item.completed","item":{"type":"command_execution","text":"cargo test"}}"#,
            "\n",
            r#"{"type":"item.completed","item":{"type":"agent_message","text":"   "}}"#,
            "\n",
            r#"{"type":"turn.completed","usage":{"input_tokens":10}}"#,
            "\n",
            "Reading prompt from stdin...\n",
        ),
    );
    assert_eq!(
        events,
        vec![
            diagnostic("command_execution: cargo test"),
            diagnostic("Reading prompt from stdin..."),
        ]
    );
}

#[test]
fn test_structured_stderr_is_diagnostic() {
    let mut parser = StructuredParser::new(false);
    let events = parser.push(
        OutputStream::Stderr,
        "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"x\"}}\n\nboom\n",
    );
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ParserEvent::Diagnostic(_)));
    assert_eq!(events[1], diagnostic("boom"));
}

#[test]
fn test_interactive_passthrough() {
    let mut parser = InteractiveParser;
    assert_eq!(
        parser.push(OutputStream::Stdout, "partial"),
        vec![ParserEvent::Text("partial".into())]
    );
    assert_eq!(
        parser.push(OutputStream::Stderr, "warn"),
        vec![ParserEvent::Text("warn".into())]
    );
    assert!(parser.finish().is_empty());
}

#[test]
fn test_parser_for_mode() {
    let line = "{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"hi\"}}\n";

    let mut interactive = parser_for(SessionMode::Interactive, false);
    assert_eq!(
        interactive.push(OutputStream::Stdout, line),
        vec![ParserEvent::Text(line.into())]
    );

    let mut structured = parser_for(SessionMode::Structured, false);
    assert_eq!(structured.push(OutputStream::Stdout, line), vec![assistant("hi")]);
}

#[test]
fn test_line_splitter_handles_lone_carriage_returns() {
    let mut splitter = LineSplitter::default();
    assert_eq!(splitter.push("one\rtwo\r"), vec!["one"]);
    // The held `\r` pairs with the `\n` of the next read
    assert_eq!(splitter.push("\nthree\r"), vec!["two"]);
    assert_eq!(splitter.finish(), Some("three".to_string()));
}
