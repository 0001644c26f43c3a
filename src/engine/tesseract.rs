use super::{EngineDiag, OcrEngine};
use crate::{
    config::Config,
    error::{Error, Result},
    util::expand_tilde,
};
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct TesseractEngine {
    cfg: Config,
    cmd: PathBuf,
}

impl TesseractEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        let cmd = resolve_tesseract_cmd(&cfg.ocr.tesseract_cmd)?;
        Ok(Self {
            cfg: cfg.clone(),
            cmd,
        })
    }

    pub fn cmd(&self) -> &Path {
        &self.cmd
    }

    /// Runs the binary with `args`. `Ok(None)` means the process was killed on timeout.
    fn run(&self, args: &[&OsStr], timeout_seconds: Option<u64>) -> Result<Option<Output>> {
        debug!(
            "tesseract run {} {:?} timeout={:?}",
            self.cmd.display(),
            args,
            timeout_seconds
        );
        let mut cmd = Command::new(&self.cmd);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.ocr.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::EngineUnavailable(format!("spawning {}: {e}", self.cmd.display()))
        })?;

        match timeout_seconds {
            Some(secs) => wait_with_timeout(&mut child, Duration::from_secs(secs)),
            None => child.wait_with_output().map(Some),
        }
        .map_err(|e| Error::EngineUnavailable(format!("waiting for tesseract: {e}")))
    }

    fn timeout(&self) -> Option<u64> {
        (self.cfg.ocr.timeout_seconds > 0).then_some(self.cfg.ocr.timeout_seconds)
    }
}

fn resolve_tesseract_cmd(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("TESSERACT_CMD") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return Ok(p);
            }
            warn!("TESSERACT_CMD points at a missing file: {}", p.display());
        }
        return Ok(PathBuf::from("tesseract"));
    }
    let p = expand_tilde(raw);
    // Bare names are looked up on PATH at spawn time.
    if p.components().count() > 1 && !p.exists() {
        return Err(Error::EngineUnavailable(format!(
            "tesseract_cmd does not exist: {}",
            p.display()
        )));
    }
    Ok(p)
}

impl OcrEngine for TesseractEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        let mut diag = EngineDiag {
            tesseract_cmd: self.cmd.display().to_string(),
            version: None,
            languages: Vec::new(),
            ok: false,
            error: None,
        };

        let version = match self.run(&[OsStr::new("--version")], Some(30)) {
            Ok(Some(out)) => out,
            Ok(None) => {
                diag.error = Some("tesseract --version timed out".to_string());
                return Ok(diag);
            }
            Err(e) => {
                diag.error = Some(e.to_string());
                return Ok(diag);
            }
        };
        // Older builds print the version banner on stderr.
        let banner = if version.stdout.is_empty() {
            String::from_utf8_lossy(&version.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&version.stdout).into_owned()
        };
        diag.version = banner.lines().next().map(|l| l.trim().to_string());

        match self.run(&[OsStr::new("--list-langs")], Some(30)) {
            Ok(Some(out)) if out.status.success() => {
                diag.languages = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .skip(1)
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
            }
            Ok(Some(out)) => {
                diag.error = Some(String::from_utf8_lossy(&out.stderr).trim().to_string());
                return Ok(diag);
            }
            Ok(None) => {
                diag.error = Some("tesseract --list-langs timed out".to_string());
                return Ok(diag);
            }
            Err(e) => {
                diag.error = Some(e.to_string());
                return Ok(diag);
            }
        }

        if !diag.languages.iter().any(|l| l == &self.cfg.ocr.language) {
            warn!(
                "configured language {} is not installed for {}",
                self.cfg.ocr.language, diag.tesseract_cmd
            );
        }
        diag.ok = version.status.success();
        Ok(diag)
    }

    fn extract(&self, image: &Path, language: &str) -> Result<String> {
        if !image.is_file() {
            return Err(Error::extraction(image, "image file not found"));
        }

        let psm = self.cfg.ocr.page_seg_mode.map(|m| m.to_string());
        let mut args: Vec<&OsStr> = vec![
            image.as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(language),
        ];
        if let Some(psm) = psm.as_deref() {
            args.push(OsStr::new("--psm"));
            args.push(OsStr::new(psm));
        }
        args.extend(self.cfg.ocr.extra_args.iter().map(OsStr::new));

        let timeout = self.timeout();
        let output = self.run(&args, timeout)?.ok_or_else(|| {
            Error::extraction(
                image,
                format!("tesseract exceeded {}s timeout", timeout.unwrap_or_default()),
            )
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(Error::extraction(
                image,
                format!("tesseract exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        if self.cfg.debug.keep_engine_stderr && !stderr.trim().is_empty() {
            debug!("tesseract stderr {}: {}", image.display(), stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Waits for `child`, killing it after `timeout`. Returns `None` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<Output>> {
    // Drain pipes while waiting so a chatty child can't block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf)?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = join_reader(stdout_thread)?;
            let stderr = join_reader(stderr_thread)?;
            return Ok(Some(Output {
                status,
                stdout,
                stderr,
            }));
        }

        if start.elapsed() > timeout {
            warn!("tesseract process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait()?;
            let _ = join_reader(stdout_thread);
            let _ = join_reader(stderr_thread);
            return Ok(None);
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

fn join_reader(
    handle: std::thread::JoinHandle<std::io::Result<Vec<u8>>>,
) -> std::io::Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| std::io::Error::other("pipe reader thread panicked"))?
}
