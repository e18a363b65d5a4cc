//! CLI tests for the `coder` binary.
//!
//! Spawns the binary against a scratch project and a minimal in-process
//! chat-completions server, and verifies exit codes.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;
use std::thread;

use coder::exit_codes;

/// Serve each canned completion to one request, then stop.
fn serve_completions(responses: Vec<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        for content in responses {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);

            let payload = serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                payload.len(),
                payload
            );
            let mut stream = reader.into_inner();
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });
    format!("http://{addr}/v1")
}

fn write_config(dir: &Path, base_url: &str, max_turns: u32) {
    let config = format!(
        r#"max_turns = {max_turns}
project_root = "project"

[model]
name = "test-model"
base_url = "{base_url}"
stream = false
request_timeout_secs = 10
"#
    );
    fs::write(dir.join("coder.toml"), config).expect("write config");
    fs::create_dir_all(dir.join("project")).expect("mkdir project");
}

fn coder(dir: &Path, prompt: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_coder"));
    cmd.current_dir(dir).arg("--prompt").arg(prompt);
    cmd
}

#[test]
fn invalid_config_exits_with_failed_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("coder.toml"), "max_turns = 0\n").expect("write");

    let output = coder(temp.path(), "anything").output().expect("run coder");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_turns must be > 0"), "{stderr}");
}

#[test]
fn completed_run_exits_ok_and_writes_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base_url = serve_completions(vec![
        "<write_file path=\"hello.txt\">hello</write_file><done>wrote hello</done>",
    ]);
    write_config(temp.path(), &base_url, 3);

    let output = coder(temp.path(), "write hello.txt")
        .output()
        .expect("run coder");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("project/hello.txt")).expect("read"),
        "hello"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("turn 1: Wrote: hello.txt Done."), "{stdout}");
    assert!(stdout.contains("wrote hello"), "{stdout}");
    assert!(temp.path().join(".coder/logs").is_dir());
}

#[test]
fn exhausted_run_exits_with_exhausted_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base_url = serve_completions(vec!["<need_context><list_dir path=\".\"/></need_context>"]);
    write_config(temp.path(), &base_url, 1);

    let status = coder(temp.path(), "look around")
        .status()
        .expect("run coder");

    assert_eq!(status.code(), Some(exit_codes::EXHAUSTED));
}

#[test]
fn verbose_run_writes_turn_transcript() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base_url = serve_completions(vec!["<done/>"]);
    write_config(temp.path(), &base_url, 2);

    let status = coder(temp.path(), "nothing to do")
        .arg("--verbose")
        .status()
        .expect("run coder");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let logs = temp.path().join(".coder/logs");
    let run_dir = fs::read_dir(&logs)
        .expect("read logs")
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("run transcript dir");
    assert!(run_dir.join("turn-1/request.md").is_file());
    assert_eq!(
        fs::read_to_string(run_dir.join("turn-1/response.md")).expect("read"),
        "<done/>"
    );
}
