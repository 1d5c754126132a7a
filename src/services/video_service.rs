use crate::error::GalleryError;
use image::{DynamicImage, ImageFormat};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Longest a single frame extraction may run before ffmpeg is killed.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decode the first frame of the first video stream in `path`.
///
/// Decoding is delegated to an `ffmpeg` executable which writes the frame to
/// stdout as PNG; the frame comes back as packed RGB like any decoded image.
pub fn first_frame(path: &Path, ffmpeg: &Path) -> Result<DynamicImage, GalleryError> {
    first_frame_within(path, ffmpeg, FRAME_TIMEOUT)
}

/// [`first_frame`] with an explicit deadline.
pub fn first_frame_within(
    path: &Path,
    ffmpeg: &Path,
    timeout: Duration,
) -> Result<DynamicImage, GalleryError> {
    let mut child = Command::new(ffmpeg)
        .args(["-nostdin", "-v", "error", "-i"])
        .arg(path)
        .args(["-map", "0:v:0", "-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GalleryError::Generation(format!("failed to run {}: {}", ffmpeg.display(), e)))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                kill(&mut child);
                tracing::warn!(path = %path.display(), timeout_s = timeout.as_secs_f64(), "ffmpeg timed out");
                return Err(GalleryError::Generation(format!(
                    "ffmpeg timed out after {:?} on {}",
                    timeout,
                    path.display()
                )));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill(&mut child);
                return Err(GalleryError::Generation(format!("failed to wait for ffmpeg: {}", e)));
            }
        }
    };

    let stdout = collect(stdout);
    if !status.success() || stdout.is_empty() {
        let stderr = collect(stderr);
        return Err(GalleryError::Generation(format!(
            "no decodable frame in {}: {}",
            path.display(),
            String::from_utf8_lossy(&stderr).trim()
        )));
    }

    let frame = image::load_from_memory_with_format(&stdout, ImageFormat::Png)?;
    Ok(DynamicImage::ImageRgb8(frame.to_rgb8()))
}

// Pipes are drained off-thread while the child is polled.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Whether `ffmpeg` can be started at all.
pub fn ffmpeg_available(ffmpeg: &Path) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
