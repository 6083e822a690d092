// fyrecall, the Glk shim and the native veneer

mod common;

use common::*;
use fyrevm::{Capabilities, EngineOptions, HostReply, HostRequest, RunState, Step, VmError};

const BUFFER: u32 = RAM_START + 0x40;

fn read_line_game() -> Vec<u8> {
    GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                op("setiosys", &["20", "0"]),
                op("streamchar", &["62"]),
                op("fyrecall", &["1", &BUFFER.to_string(), "10", "*R:0"]),
                op("quit", &[]),
            ],
        )
        .word(RAM_START, 0xFFFF)
        .build()
}

fn line_buffer(engine: &fyrevm::Engine) -> (u32, Vec<u8>) {
    let image = engine.image();
    let len = image.read_u32(BUFFER).unwrap();
    (len, image.read_bytes(BUFFER + 4, len).unwrap().to_vec())
}

// === INPUT ===

#[test]
fn test_read_line_suspends_and_truncates() {
    let mut engine = engine(read_line_game());
    engine.set_capabilities(Capabilities::interactive());

    let state = engine.start().unwrap();
    assert_eq!(state, RunState::Waiting(HostRequest::ReadLine { max_len: 10 }));
    assert_eq!(engine.step().unwrap(), Step::Waiting);
    // output is flushed before the host is asked
    assert_eq!(engine.take_output().get("MAIN").map(String::as_str), Some(">"));

    let state = engine
        .resume_after_wait(HostReply::Line(Some("hello world".to_string())))
        .unwrap();
    assert_eq!(state, RunState::Halted);
    assert_eq!(line_buffer(&engine), (10, b"hello worl".to_vec()));
    assert_eq!(ram_word(&engine, 0), 0);
}

#[test]
fn test_read_line_without_capability_is_empty() {
    let mut engine = engine(read_line_game());

    assert_eq!(engine.start().unwrap(), RunState::Halted);
    assert_eq!(line_buffer(&engine), (0, Vec::new()));
    assert_eq!(ram_word(&engine, 0), 0);
}

#[test]
fn test_read_line_replaces_wide_characters() {
    let mut engine = engine(read_line_game());
    engine.set_capabilities(Capabilities::interactive());

    engine.start().unwrap();
    engine
        .resume_after_wait(HostReply::Line(Some("café →".to_string())))
        .unwrap();
    assert_eq!(line_buffer(&engine), (6, b"caf\xe9 ?".to_vec()));
}

#[test]
fn test_read_key() {
    let game = GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[op("fyrecall", &["2", "0", "0", "*R:0"]), op("quit", &[])],
        )
        .build();

    let mut interactive = engine(game.clone());
    interactive.set_capabilities(Capabilities::interactive());
    assert_eq!(
        interactive.start().unwrap(),
        RunState::Waiting(HostRequest::ReadKey)
    );
    interactive
        .resume_after_wait(HostReply::Key(Some('x')))
        .unwrap();
    assert_eq!(ram_word(&interactive, 0), 'x' as u32);

    let mut headless = engine(game);
    assert_eq!(headless.start().unwrap(), RunState::Halted);
    assert_eq!(ram_word(&headless, 0), 0);
}

// === OTHER CALLS ===

#[test]
fn test_case_mapping() {
    let game = GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                op("fyrecall", &["4", "97", "0", "*R:0"]),
                op("fyrecall", &["3", "81", "0", "*R:4"]),
                op("fyrecall", &["4", "49", "0", "*R:8"]),
                op("fyrecall", &["4", "233", "0", "*R:C"]),
                op("quit", &[]),
            ],
        )
        .build();
    let mut engine = engine(game);

    run_to_end(&mut engine);
    assert_eq!(ram_word(&engine, 0), 'A' as u32);
    assert_eq!(ram_word(&engine, 4), 'q' as u32);
    assert_eq!(ram_word(&engine, 8), '1' as u32);
    assert_eq!(ram_word(&engine, 12), 'É' as u32);
}

#[test]
fn test_transition_and_style_calls() {
    let game = GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                op("fyrecall", &["7", "1", "0", "*R:0"]),
                op("fyrecall", &["8", "3", "0", "*R:4"]),
                op("quit", &[]),
            ],
        )
        .word(RAM_START, 9)
        .word(RAM_START + 4, 9)
        .build();
    let mut engine = engine(game);

    run_to_end(&mut engine);
    assert!(engine.take_transition_request());
    assert!(!engine.take_transition_request());
    assert_eq!(ram_word(&engine, 0), 0);
    assert_eq!(ram_word(&engine, 4), 0);
}

#[test]
fn test_fyrecall_disabled() {
    let game = GameBuilder::new()
        .function(START_FUNC, &[], &[op("fyrecall", &["3", "65", "0", "0"])])
        .build();
    let mut engine =
        fyrevm::Engine::new(game, EngineOptions::default().with_fyre(false)).unwrap();

    let err = engine.start().unwrap_err();
    assert!(matches!(err.root(), VmError::FyreCallDisabled));
}

#[test]
fn test_unknown_fyrecall() {
    let game = GameBuilder::new()
        .function(START_FUNC, &[], &[op("fyrecall", &["99", "0", "0", "0"])])
        .build();
    let mut engine = engine(game);

    let err = engine.start().unwrap_err();
    assert!(matches!(err.root(), VmError::UnknownFyreCall(99)));
}

#[test]
fn test_glk_buffer_and_string_output() {
    let game = GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                op("setiosys", &["2", "0"]),
                op("copy", &["3", "push"]),
                op("copy", &["784", "push"]),
                op("glk", &["132", "2", "*R:0"]),
                op("copy", &["768", "push"]),
                op("glk", &["130", "1", "0"]),
                op("copy", &["0", "push"]),
                op("glk", &["4", "1", "*R:4"]),
                op("quit", &[]),
            ],
        )
        .cstring(0x300, " end")
        .bytes(0x310, b"abcdef")
        .word(RAM_START + 4, 9)
        .build();
    let mut engine = engine(game);

    let output = run_to_end(&mut engine);
    assert_eq!(output.get("MAIN").map(String::as_str), Some("abc end"));
    assert_eq!(ram_word(&engine, 0), 0);
    assert_eq!(ram_word(&engine, 4), 0);
}

// === VENEER ===

/// A function at 0x200 that returns 77 unless intercepted
fn veneer_game(install: Vec<u8>) -> Vec<u8> {
    GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                install,
                op("callfi", &["512", "256", "*R:4"]),
                op("callfi", &["512", "768", "*R:8"]),
                op("quit", &[]),
            ],
        )
        .function(0x200, &[(4, 1)], &[op("return", &["77"])])
        .cstring(0x300, "text")
        .build()
}

#[test]
fn test_set_veneer_intercepts_calls() {
    let game = veneer_game(op("fyrecall", &["6", "1", "512", "*R:0"]));
    let mut engine = engine(game);

    run_to_end(&mut engine);
    assert_eq!(ram_word(&engine, 0), 1);
    assert_eq!(ram_word(&engine, 4), 2);
    assert_eq!(ram_word(&engine, 8), 3);
    assert_eq!(engine.veneer().intercept_count(), 1);
}

#[test]
fn test_accelfunc_intercepts_calls() {
    let game = veneer_game(op("accelfunc", &["1", "512"]));
    let mut engine = engine(game);

    run_to_end(&mut engine);
    assert_eq!(ram_word(&engine, 4), 2);
    assert_eq!(ram_word(&engine, 8), 3);
}

#[test]
fn test_veneer_disabled_runs_bytecode() {
    let game = veneer_game(op("fyrecall", &["6", "1", "512", "*R:0"]));
    let mut engine =
        fyrevm::Engine::new(game, EngineOptions::default().with_veneer(false)).unwrap();

    assert_eq!(engine.start().unwrap(), RunState::Halted);
    assert_eq!(ram_word(&engine, 0), 0);
    assert_eq!(ram_word(&engine, 4), 77);
    assert_eq!(ram_word(&engine, 8), 77);
}

#[test]
fn test_veneer_tailcall_returns_result() {
    let game = GameBuilder::new()
        .function(
            START_FUNC,
            &[],
            &[
                op("accelfunc", &["1", "512"]),
                op("callf", &["576", "*R:0"]),
                op("quit", &[]),
            ],
        )
        .function(0x200, &[(4, 1)], &[op("return", &["77"])])
        .function(
            0x240,
            &[],
            &[op("copy", &["256", "push"]), op("tailcall", &["512", "1"])],
        )
        .build();
    let mut engine = engine(game);

    run_to_end(&mut engine);
    assert_eq!(ram_word(&engine, 0), 2);
    assert_eq!(engine.sp(), engine.frame_len());
}
