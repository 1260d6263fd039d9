#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use mediaq::{ToolError, ToolInvocation, ToolOutput, ToolRunner};

type Handler = Box<dyn Fn(&ToolInvocation) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// `ToolRunner` stand-in that records every invocation.
///
/// Each program gets a handler. Programs without one behave like a
/// successful converter: the last argument is treated as the output path and
/// a small file is written there.
pub struct ScriptedRunner {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Installs (or replaces) the handler for `program`.
    pub fn on<F>(&self, program: &str, handler: F) -> &Self
    where
        F: Fn(&ToolInvocation) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .expect("Failed to lock handlers")
            .insert(program.to_string(), Box::new(handler));
        self
    }

    /// ffprobe answers with the given JSON document.
    pub fn probe_returns(&self, json: String) -> &Self {
        self.on("ffprobe", move |_| Ok(stdout(&json)))
    }

    /// `program` behaves as if it were not installed.
    pub fn missing(&self, program: &str) -> &Self {
        let name = program.to_string();
        self.on(program, move |_| {
            Err(ToolError::NotFound {
                program: name.clone(),
            })
        })
    }

    /// `program` exits non-zero with `stderr`.
    pub fn fails(&self, program: &str, stderr: &str) -> &Self {
        let name = program.to_string();
        let stderr = stderr.to_string();
        self.on(program, move |_| {
            Err(ToolError::Failed {
                program: name.clone(),
                code: 1,
                stderr: stderr.clone(),
            })
        })
    }

    /// `program` fails for its first `failures` calls, then writes output.
    pub fn fails_times(&self, program: &str, failures: usize) -> &Self {
        let name = program.to_string();
        let remaining = Mutex::new(failures);
        self.on(program, move |invocation| {
            let mut remaining = remaining.lock().expect("Failed to lock counter");
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ToolError::Failed {
                    program: name.clone(),
                    code: 1,
                    stderr: "transient failure".to_string(),
                });
            }
            write_output(invocation)
        })
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().expect("Failed to lock calls").clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.program == program)
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.calls
            .lock()
            .expect("Failed to lock calls")
            .push(invocation.clone());

        let handlers = self.handlers.lock().expect("Failed to lock handlers");
        match handlers.get(&invocation.program) {
            Some(handler) => handler(invocation),
            None => write_output(invocation),
        }
    }
}

fn stdout(text: &str) -> ToolOutput {
    ToolOutput {
        stdout: text.to_string(),
        stderr: String::new(),
    }
}

/// Writes a fake converted file at the invocation's last argument.
pub fn write_output(invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
    let output = invocation
        .args
        .last()
        .expect("Invocation has no output argument");
    std::fs::write(Path::new(output), b"converted-bytes").expect("Failed to write fake output");
    Ok(stdout(""))
}

/// ffprobe JSON for a single video stream with optional audio.
pub fn probe_json(
    video_codec: &str,
    width: u32,
    height: u32,
    audio_codec: Option<&str>,
    duration: f64,
) -> String {
    let mut streams = vec![serde_json::json!({
        "codec_type": "video",
        "codec_name": video_codec,
        "width": width,
        "height": height,
        "r_frame_rate": "30/1",
    })];
    if let Some(codec) = audio_codec {
        streams.push(serde_json::json!({
            "codec_type": "audio",
            "codec_name": codec,
        }));
    }
    serde_json::json!({
        "streams": streams,
        "format": {
            "duration": format!("{:.6}", duration),
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
        },
    })
    .to_string()
}
