use std::collections::VecDeque;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{DeflickerError, Result};
use crate::frame::{Frame, FrameRate, PixelFormat, SourceInfo, StreamRole};
use crate::sink::{EncoderParams, FrameEncoder, Submit};
use crate::source::FrameDecoder;

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Lines of encoder stderr kept for the failure message.
const STDERR_TAIL_LINES: usize = 8;

/// Query the first video stream of `path` with ffprobe.
///
/// `pixel_format` is the packed format frames will be decoded into; it is
/// recorded in the returned info as-is.
pub fn probe_video(path: &Path, pixel_format: PixelFormat) -> Result<SourceInfo> {
    let open_err = |reason: String| DeflickerError::Open {
        collaborator: "ffprobe",
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new(FFPROBE)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_frames,codec_name",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| open_err(format!("failed to run ffprobe ({e}); is ffmpeg installed?")))?;

    if !output.status.success() {
        return Err(open_err(stderr_text(&output.stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let probe = parse_probe_output(&stdout);
    let (width, height) = match (probe.width, probe.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(open_err("no video stream found".into())),
    };

    Ok(SourceInfo {
        path: path.to_path_buf(),
        width,
        height,
        pixel_format,
        frame_rate: probe.frame_rate,
        frame_count: probe.frame_count,
        codec: probe.codec,
    })
}

#[derive(Debug, Default, PartialEq)]
struct ProbeFields {
    width: Option<u32>,
    height: Option<u32>,
    frame_rate: Option<FrameRate>,
    frame_count: Option<u64>,
    codec: Option<String>,
}

/// Parse `key=value` lines as printed by `ffprobe -of default`. Fields
/// ffprobe reports as `N/A` (or `0/0` for rates) are left unset.
fn parse_probe_output(text: &str) -> ProbeFields {
    let mut fields = ProbeFields::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "width" => fields.width = value.parse().ok(),
            "height" => fields.height = value.parse().ok(),
            "r_frame_rate" => fields.frame_rate = value.parse().ok(),
            "nb_frames" => fields.frame_count = value.parse().ok(),
            "codec_name" if !value.is_empty() && value != "N/A" => {
                fields.codec = Some(value.to_string())
            }
            _ => {}
        }
    }
    fields
}

fn stderr_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        "no diagnostic output".into()
    } else {
        text.lines().last().unwrap_or(text).to_string()
    }
}

/// Read `reader` to the end, keeping only its last `keep` lines.
fn tail_lines(reader: impl Read, keep: usize) -> String {
    let mut tail = VecDeque::with_capacity(keep);
    for line in BufReader::new(reader).split(b'\n') {
        let Ok(line) = line else { break };
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(String::from_utf8_lossy(&line).into_owned());
    }
    Vec::from(tail).join("\n")
}

/// Drain a child's stderr on its own thread so a chatty process never
/// blocks on a full pipe.
fn spawn_stderr_drain(stderr: ChildStderr) -> Option<JoinHandle<String>> {
    thread::Builder::new()
        .name("ffmpeg-stderr".into())
        .spawn(move || tail_lines(stderr, STDERR_TAIL_LINES))
        .ok()
}

/// Decodes a video file by piping raw packed frames out of an ffmpeg process.
pub struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    info: SourceInfo,
    frame_bytes: usize,
    done: bool,
}

impl FfmpegDecoder {
    pub fn open(path: &Path, pixel_format: PixelFormat) -> Result<Self> {
        let info = probe_video(path, pixel_format)?;
        let open_err = |reason: String| DeflickerError::Open {
            collaborator: "ffmpeg decoder",
            path: path.to_path_buf(),
            reason,
        };

        let mut child = Command::new(FFMPEG)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-f",
                "rawvideo",
                "-pix_fmt",
                pixel_format.ffmpeg_name(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn ffmpeg ({e}); is ffmpeg installed?")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| open_err("ffmpeg stdout was not captured".into()))?;

        let frame_bytes = info.width as usize * info.height as usize * pixel_format.channels();
        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            format = %pixel_format,
            "Opened ffmpeg decoder"
        );

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            info,
            frame_bytes,
            done: false,
        })
    }

    /// Read exactly one frame. `Ok(None)` when the pipe closed cleanly on a
    /// frame boundary.
    fn read_frame_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(decode_err(e.to_string())),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(decode_err(format!(
                "truncated frame: got {filled} of {} bytes",
                buf.len()
            )));
        }
        Ok(Some(buf))
    }

    fn check_exit(&mut self) -> Result<()> {
        let status = self.child.wait().map_err(|e| decode_err(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(decode_err(format!("ffmpeg decoder exited with {status}")))
        }
    }
}

fn decode_err(reason: String) -> DeflickerError {
    // Stream role and frame index are filled in by `FrameSource`.
    DeflickerError::Decode {
        stream: StreamRole::Target,
        frame: None,
        reason,
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.done {
            return Ok(None);
        }
        match self.read_frame_bytes() {
            Ok(Some(buf)) => {
                let frame = Frame::from_raw(
                    self.info.width as usize,
                    self.info.height as usize,
                    self.info.pixel_format.channels(),
                    buf,
                )?;
                Ok(Some(frame))
            }
            Ok(None) => {
                self.done = true;
                self.check_exit()?;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Encodes packed frames by piping them into an ffmpeg process.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    format: PixelFormat,
    frame_bytes: usize,
    submitted: u64,
}

impl FfmpegEncoder {
    pub fn open(params: &EncoderParams) -> Result<Self> {
        let open_err = |reason: String| DeflickerError::Open {
            collaborator: "ffmpeg encoder",
            path: params.path.clone(),
            reason,
        };

        let args = encoder_args(params);
        debug!(args = ?args, "Spawning ffmpeg encoder");

        let mut child = Command::new(FFMPEG)
            .args(&args)
            .arg(&params.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn ffmpeg ({e}); is ffmpeg installed?")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| open_err("ffmpeg stdin was not captured".into()))?;
        let stderr = child.stderr.take().and_then(spawn_stderr_drain);

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stderr,
            format: params.input_format,
            frame_bytes: params.width as usize
                * params.height as usize
                * params.input_format.channels(),
            submitted: 0,
        })
    }

    /// Collected stderr tail; the drain thread ends once the process exits.
    fn stderr_tail(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

/// Command-line arguments for the encoder process, excluding the output path.
fn encoder_args(params: &EncoderParams) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-v",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        params.input_format.ffmpeg_name(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend([
        "-s".into(),
        format!("{}x{}", params.width, params.height),
        "-r".into(),
        params.frame_rate.to_string(),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
        "-c:v".into(),
        params.codec.clone(),
    ]);

    if params.codec.starts_with("libx26") {
        args.extend([
            "-crf".into(),
            params.crf.to_string(),
            "-preset".into(),
            params.preset.clone(),
        ]);
    }
    if !params.output_pix_fmt.is_empty() {
        args.extend(["-pix_fmt".into(), params.output_pix_fmt.clone()]);
    }
    args.extend(params.extra_args.iter().cloned());
    args
}

impl FrameEncoder for FfmpegEncoder {
    fn input_format(&self) -> PixelFormat {
        self.format
    }

    fn submit(&mut self, frame: &Frame, _pts: i64) -> Result<Submit> {
        // ffmpeg assigns timestamps from the constant input rate.
        let raw = frame.as_raw();
        if raw.len() != self.frame_bytes {
            return Err(DeflickerError::InvalidBuffer {
                expected: self.frame_bytes,
                actual: raw.len(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or_else(|| DeflickerError::Encode {
            frame: None,
            reason: "encoder input already closed".into(),
        })?;
        stdin.write_all(raw).map_err(|e| DeflickerError::Write {
            frame: None,
            reason: format!("ffmpeg encoder pipe: {e}"),
        })?;
        self.submitted += 1;
        Ok(Submit::Accepted)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| DeflickerError::Write {
                frame: None,
                reason: format!("ffmpeg encoder pipe: {e}"),
            })?;
            // Dropping stdin closes the pipe so ffmpeg drains and writes the trailer.
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.flush()?;
        let status = self.child.wait().map_err(|e| DeflickerError::Write {
            frame: None,
            reason: e.to_string(),
        })?;
        let stderr = self.stderr_tail();
        if !status.success() {
            return Err(DeflickerError::Write {
                frame: None,
                reason: format!(
                    "ffmpeg encoder exited with {status}: {}",
                    stderr_text(stderr.as_bytes())
                ),
            });
        }
        debug!(frames = self.submitted, "ffmpeg encoder finished");
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stdin.take();
        if let Ok(None) = self.child.try_wait() {
            warn!("Encoder dropped before finishing, killing ffmpeg");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        self.stderr_tail();
    }
}
