//! Relay sessions against a scripted in-process SMTP server.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mailwright_mime::Mail;
use mailwright_smtp::{Credentials, Error, RelayConfig, RelaySender, Security};

/// What the server saw during one session.
#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<String>,
    data: String,
}

/// Server behavior for one session.
#[derive(Clone, Copy, Default)]
struct Script {
    extensions: &'static [&'static str],
    reject_rcpt: Option<&'static str>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches("\r\n").to_string()),
    }
}

fn reply(stream: &mut TcpStream, text: &str) {
    stream.write_all(text.as_bytes()).unwrap();
    stream.write_all(b"\r\n").unwrap();
}

fn serve(script: Script) -> (u16, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut transcript = Transcript::default();

        reply(&mut stream, "220 mx.test ESMTP ready");
        while let Some(line) = read_line(&mut reader) {
            transcript.commands.push(line.clone());
            let verb = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            match verb.as_str() {
                "EHLO" => {
                    if script.extensions.is_empty() {
                        reply(&mut stream, "250 mx.test");
                    } else {
                        reply(&mut stream, "250-mx.test");
                        let (last, rest) = script.extensions.split_last().unwrap();
                        for ext in rest {
                            reply(&mut stream, &format!("250-{ext}"));
                        }
                        reply(&mut stream, &format!("250 {last}"));
                    }
                }
                "AUTH" if line.eq_ignore_ascii_case("AUTH LOGIN") => {
                    reply(&mut stream, "334 VXNlcm5hbWU6");
                    transcript.commands.push(read_line(&mut reader).unwrap());
                    reply(&mut stream, "334 UGFzc3dvcmQ6");
                    transcript.commands.push(read_line(&mut reader).unwrap());
                    reply(&mut stream, "235 2.7.0 Authentication successful");
                }
                "AUTH" => reply(&mut stream, "235 2.7.0 Authentication successful"),
                "MAIL" => reply(&mut stream, "250 2.1.0 Ok"),
                "RCPT" => match script.reject_rcpt {
                    Some(addr) if line.contains(addr) => {
                        reply(&mut stream, "550 5.1.1 No such user");
                    }
                    _ => reply(&mut stream, "250 2.1.5 Ok"),
                },
                "DATA" => {
                    reply(&mut stream, "354 End data with <CR><LF>.<CR><LF>");
                    while let Some(data_line) = read_line(&mut reader) {
                        if data_line == "." {
                            break;
                        }
                        transcript.data.push_str(&data_line);
                        transcript.data.push_str("\r\n");
                    }
                    reply(&mut stream, "250 2.0.0 Ok: queued");
                }
                "QUIT" => {
                    reply(&mut stream, "221 2.0.0 Bye");
                    break;
                }
                _ => reply(&mut stream, "502 5.5.2 Command not recognized"),
            }
        }
        transcript
    });

    (port, handle)
}

fn relay(port: u16) -> RelayConfig {
    RelayConfig::builder("127.0.0.1")
        .port(port)
        .helo_name("client.test")
        .timeout(Duration::from_secs(5))
        .build()
}

fn sample_mail() -> Mail {
    let mut mail = Mail::new().unwrap();
    mail.set_from("sender@example.com", "Sender").unwrap();
    mail.add_to("to@example.com", "").unwrap();
    mail.add_cc("cc@example.com", "").unwrap();
    mail.add_bcc("hidden@example.com", "").unwrap();
    mail.set_subject("Relayed");
    mail.set_body_text("First line\r\n.leading dot\r\nlast").unwrap();
    mail
}

#[test]
fn test_successful_session() {
    init_tracing();
    let (port, server) = serve(Script::default());

    let mut mail = sample_mail();
    mail.send(&RelaySender::new(relay(port))).unwrap();

    let transcript = server.join().unwrap();
    assert_eq!(
        transcript.commands,
        [
            "EHLO client.test",
            "MAIL FROM:<sender@example.com>",
            "RCPT TO:<to@example.com>",
            "RCPT TO:<cc@example.com>",
            "RCPT TO:<hidden@example.com>",
            "DATA",
            "QUIT",
        ]
    );
    assert!(transcript.data.contains("Subject: Relayed\r\n"));
    assert!(transcript.data.contains("Cc: <cc@example.com>\r\n"));
    assert!(!transcript.data.contains("hidden@example.com"));
}

#[test]
fn test_leading_dots_are_stuffed() {
    let (port, server) = serve(Script::default());

    let mut mail = sample_mail();
    mail.send(&RelaySender::new(relay(port))).unwrap();

    let transcript = server.join().unwrap();
    assert!(transcript.data.contains("\r\n..leading dot\r\n"));
    assert!(transcript.data.ends_with("\r\nlast\r\n"));
}

#[test]
fn test_eight_bit_mime_is_announced() {
    let (port, server) = serve(Script {
        extensions: &["8BITMIME", "SIZE 1000000"],
        ..Script::default()
    });

    let mut mail = sample_mail();
    mail.send(&RelaySender::new(relay(port))).unwrap();

    let transcript = server.join().unwrap();
    assert_eq!(
        transcript.commands[1],
        "MAIL FROM:<sender@example.com> BODY=8BITMIME"
    );
}

#[test]
fn test_required_tls_without_starttls() {
    let (port, server) = serve(Script::default());

    let config = RelayConfig::builder("127.0.0.1")
        .port(port)
        .security(Security::Required)
        .helo_name("client.test")
        .build();
    let mut mail = sample_mail();
    let recipients = mail.recipients();

    let err = RelaySender::new(config)
        .deliver("sender@example.com", &recipients, &mut mail)
        .unwrap_err();
    assert!(matches!(err, Error::TlsRequired { ref host } if host == "127.0.0.1"));

    // the client hangs up before sending anything else
    let transcript = server.join().unwrap();
    assert_eq!(transcript.commands, ["EHLO client.test"]);
}

#[test]
fn test_rejected_recipient_aborts() {
    let (port, server) = serve(Script {
        reject_rcpt: Some("cc@example.com"),
        ..Script::default()
    });

    let mut mail = sample_mail();
    let recipients = mail.recipients();
    let err = RelaySender::new(relay(port))
        .deliver("sender@example.com", &recipients, &mut mail)
        .unwrap_err();

    match &err {
        Error::SmtpError { code, message } => {
            assert_eq!(*code, 550);
            assert_eq!(message, "5.1.1 No such user");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(err.is_permanent());

    let transcript = server.join().unwrap();
    assert_eq!(transcript.commands.last().unwrap(), "RCPT TO:<cc@example.com>");
    assert!(transcript.data.is_empty());
}

#[test]
fn test_rejection_surfaces_as_transport_error() {
    let (port, server) = serve(Script {
        reject_rcpt: Some("to@example.com"),
        ..Script::default()
    });

    let mut mail = sample_mail();
    match mail.send(&RelaySender::new(relay(port))) {
        Err(mailwright_mime::Error::Transport(inner)) => {
            assert_eq!(inner.to_string(), "SMTP error 550: 5.1.1 No such user");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    server.join().unwrap();
}

#[test]
fn test_auth_plain_preferred() {
    let (port, server) = serve(Script {
        extensions: &["AUTH LOGIN PLAIN"],
        ..Script::default()
    });

    let config = RelayConfig::builder("127.0.0.1")
        .port(port)
        .helo_name("client.test")
        .credentials(Credentials::new("user", "pass"))
        .build();
    let mut mail = sample_mail();
    mail.send(&RelaySender::new(config)).unwrap();

    let transcript = server.join().unwrap();
    // base64("\0user\0pass")
    assert_eq!(transcript.commands[1], "AUTH PLAIN AHVzZXIAcGFzcw==");
    assert_eq!(transcript.commands[2], "MAIL FROM:<sender@example.com>");
}

#[test]
fn test_auth_login_when_only_mechanism() {
    let (port, server) = serve(Script {
        extensions: &["AUTH LOGIN"],
        ..Script::default()
    });

    let config = RelayConfig::builder("127.0.0.1")
        .port(port)
        .helo_name("client.test")
        .credentials(Credentials::new("user", "pass"))
        .build();
    let mut mail = sample_mail();
    mail.send(&RelaySender::new(config)).unwrap();

    let transcript = server.join().unwrap();
    assert_eq!(
        &transcript.commands[1..4],
        ["AUTH LOGIN", "dXNlcg==", "cGFzcw=="]
    );
}

#[test]
fn test_server_hangup_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        reply(&mut stream, "220 mx.test ESMTP ready");
        // read EHLO, then hang up
        read_line(&mut reader);
    });

    let mut mail = sample_mail();
    let recipients = mail.recipients();
    let err = RelaySender::new(relay(port))
        .deliver("sender@example.com", &recipients, &mut mail)
        .unwrap_err();
    server.join().unwrap();

    match err {
        Error::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected EOF, got {other:?}"),
    }
}

#[test]
fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (_stream, _) = listener.accept().unwrap();
        // keep the connection open without greeting
        let _ = done_rx.recv();
    });

    let config = RelayConfig::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_millis(200))
        .build();
    let mut mail = sample_mail();
    let recipients = mail.recipients();
    let err = RelaySender::new(config)
        .deliver("sender@example.com", &recipients, &mut mail)
        .unwrap_err();

    done_tx.send(()).unwrap();
    server.join().unwrap();
    assert!(matches!(err, Error::Io(_)));
}
