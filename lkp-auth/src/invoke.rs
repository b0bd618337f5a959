//! Function-invocation channel.
//!
//! Requests to the authority and to policy functions are JSON payloads sent
//! over a request/response channel. A function-level error (the function
//! ran and failed) is reported separately from the payload, so it can never
//! be mistaken for a successful response that happens to deny.

use std::io::Write;
use std::process::{Command, Stdio};

use lkp_core::cert::FailurePayload;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Raw result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOutput {
    pub payload: Vec<u8>,
    /// Set when the function itself failed. The payload then holds a
    /// [`FailurePayload`] if the function produced one.
    pub function_error: Option<String>,
}

/// Errors from invoking a function.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum InvokeError {
    /// The function could not be reached or started.
    #[error("invocation failed: {0}")]
    Transport(String),

    /// The function ran and reported an error.
    #[error("{error_type}: {message}")]
    Function { error_type: String, message: String },

    /// The request could not be encoded or the response decoded.
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A request/response function channel.
pub trait FunctionInvoker: Send + Sync {
    fn invoke(&self, function: &str, payload: &[u8]) -> Result<InvokeOutput, InvokeError>;
}

/// Invoke `function` with `request` serialized as JSON and decode the reply.
///
/// # Errors
///
/// Returns [`InvokeError::Function`] if the function reported an error,
/// carrying its `errorType`/`errorMessage` when present.
pub fn invoke_json<Req, Resp>(
    invoker: &dyn FunctionInvoker,
    function: &str,
    request: &Req,
) -> Result<Resp, InvokeError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_vec(request)?;
    let output = invoker.invoke(function, &payload)?;

    if let Some(function_error) = output.function_error {
        return Err(match serde_json::from_slice::<FailurePayload>(&output.payload) {
            Ok(failure) => InvokeError::Function {
                error_type: failure.error_type,
                message: failure.error_message,
            },
            Err(_) => InvokeError::Function {
                error_type: function_error,
                message: String::from_utf8_lossy(&output.payload).trim().to_string(),
            },
        });
    }

    Ok(serde_json::from_slice(&output.payload)?)
}

/// Runs a function as a local process: payload on stdin, response on stdout.
///
/// The function reference is a whitespace-separated command line, e.g.
/// `lkp-authority invoke`. A non-zero exit is a function error.
#[derive(Debug, Clone, Default)]
pub struct ProcessInvoker;

impl FunctionInvoker for ProcessInvoker {
    fn invoke(&self, function: &str, payload: &[u8]) -> Result<InvokeOutput, InvokeError> {
        let mut parts = function.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| InvokeError::Transport("empty function reference".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| InvokeError::Transport(format!("{program}: {e}")))?;

        // Feed stdin from a separate thread so a chatty child cannot fill
        // the stdout pipe while we are still writing.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| InvokeError::Transport("child stdin unavailable".to_string()))?;
        let input = payload.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| InvokeError::Transport(format!("{program}: {e}")))?;

        match writer.join() {
            Ok(Ok(())) => {}
            // The child may exit without reading everything; its status decides.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(InvokeError::Transport(e.to_string())),
            Err(_) => return Err(InvokeError::Transport("stdin writer panicked".to_string())),
        }

        let function_error = if output.status.success() {
            None
        } else {
            Some(match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            })
        };

        Ok(InvokeOutput {
            payload: output.stdout,
            function_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        value: u32,
    }

    /// Replies with a fixed output and records the last request.
    struct Canned {
        output: InvokeOutput,
        seen: Mutex<Vec<u8>>,
    }

    impl FunctionInvoker for Canned {
        fn invoke(&self, _function: &str, payload: &[u8]) -> Result<InvokeOutput, InvokeError> {
            *self.seen.lock().unwrap() = payload.to_vec();
            Ok(self.output.clone())
        }
    }

    fn canned(payload: &str, function_error: Option<&str>) -> Canned {
        Canned {
            output: InvokeOutput {
                payload: payload.as_bytes().to_vec(),
                function_error: function_error.map(str::to_string),
            },
            seen: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_invoke_json_success() {
        let invoker = canned(r#"{"value":2}"#, None);
        let reply: Ping = invoke_json(&invoker, "f", &Ping { value: 1 }).unwrap();
        assert_eq!(reply, Ping { value: 2 });
        assert_eq!(*invoker.seen.lock().unwrap(), br#"{"value":1}"#);
    }

    #[test]
    fn test_function_error_uses_failure_payload() {
        let invoker = canned(
            r#"{"errorType":"AuthorizationDenied","errorMessage":"mfa required"}"#,
            Some("Unhandled"),
        );
        let result: Result<Ping, _> = invoke_json(&invoker, "f", &Ping { value: 1 });
        match result {
            Err(InvokeError::Function {
                error_type,
                message,
            }) => {
                assert_eq!(error_type, "AuthorizationDenied");
                assert_eq!(message, "mfa required");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_function_error_without_payload() {
        let invoker = canned("boom\n", Some("exit status 2"));
        let result: Result<Ping, _> = invoke_json(&invoker, "f", &Ping { value: 1 });
        assert!(matches!(
            result,
            Err(InvokeError::Function { ref error_type, ref message })
                if error_type == "exit status 2" && message == "boom"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_invoker_echoes() {
        let reply: Ping = invoke_json(&ProcessInvoker, "cat", &Ping { value: 7 }).unwrap();
        assert_eq!(reply, Ping { value: 7 });
    }

    #[cfg(unix)]
    #[test]
    fn test_process_invoker_nonzero_exit() {
        let output = ProcessInvoker.invoke("false", b"{}").unwrap();
        assert_eq!(output.function_error.as_deref(), Some("exit status 1"));
    }

    #[test]
    fn test_process_invoker_missing_program() {
        assert!(matches!(
            ProcessInvoker.invoke("   ", b"{}"),
            Err(InvokeError::Transport(_))
        ));
        assert!(matches!(
            ProcessInvoker.invoke("/nonexistent/lkp-function", b"{}"),
            Err(InvokeError::Transport(_))
        ));
    }
}
