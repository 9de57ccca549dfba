//! Update session state machine
//!
//! One [`UpdateSession`] drives a single image into flash at a time:
//! `begin`, any number of `write`/`write_stream` calls, then `end` or
//! `abort`. Every failure inside an active session tears it down and leaves
//! a sticky [`UpdateError`] behind; the boot partition only changes after
//! the size, header, flash, checksum and signature checks have all passed.

use std::io;

use tracing::{debug, error, info, warn};

use crate::checksum::{self, ImageChecksum};
use crate::config::UpdateConfig;
use crate::error::{NO_ERROR, UpdateError};
use crate::partition::{ResolvedTarget, TargetKind, UpdateSize, resolve_target};
use crate::platform::{FlashPlatform, StatusPin};
use crate::sector::{self, HeaderGuard, SectorBuffer};
use crate::signature::SignatureGate;
use crate::stream::{self, ByteSource};

type ProgressCallback = Box<dyn FnMut(u32, u32) + Send>;

/// State owned by a running update
#[derive(Debug)]
struct ActiveUpdate {
    target: ResolvedTarget,
    guard: Option<HeaderGuard>,
    declared: u32,
    sector: SectorBuffer,
    checksum: ImageChecksum,
    header_enabled: bool,
}

impl ActiveUpdate {
    fn written(&self) -> u32 {
        self.sector.written()
    }

    /// Bytes that may still be handed to `write`
    fn room(&self) -> u32 {
        self.declared - self.written() - self.sector.len() as u32
    }

    fn is_finished(&self) -> bool {
        self.written() == self.declared
    }

    fn should_flush(&self) -> bool {
        !self.sector.is_empty()
            && (self.sector.is_full() || self.sector.len() as u32 == self.declared - self.written())
    }

    fn flush<P: FlashPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        progress: &mut dyn FnMut(u32, u32),
    ) -> Result<(), UpdateError> {
        self.sector.flush(
            platform,
            &self.target,
            &mut self.checksum,
            self.declared,
            progress,
        )
    }

    /// Write the withheld header block to its final place
    fn enable<P: FlashPlatform + ?Sized>(&mut self, platform: &mut P) -> bool {
        if self.header_enabled || self.guard.is_none() {
            return true;
        }
        let Some(header) = self.sector.withheld() else {
            warn!("no header block to enable {}", self.target.partition.label);
            return false;
        };
        match platform.write(&self.target.partition, self.target.base_offset, header) {
            Ok(()) => {
                self.header_enabled = true;
                true
            }
            Err(err) => {
                error!("enabling {} failed: {}", self.target.partition.label, err);
                false
            }
        }
    }

    /// Erase everything past the last sector the image touched
    ///
    /// A reused slot still holds the tail of its previous image; the
    /// partition hash must see erased flash there.
    fn erase_tail<P: FlashPlatform + ?Sized>(
        &self,
        platform: &mut P,
        sector_size: u32,
    ) -> Result<(), UpdateError> {
        let partition = &self.target.partition;
        let sector = u64::from(sector_size);
        let touched = u64::from(self.written()).div_ceil(sector) * sector;
        let start = u64::from(self.target.base_offset) + touched;
        let end = u64::from(partition.size);
        if start >= end {
            return Ok(());
        }
        let (Ok(start), Ok(len)) = (u32::try_from(start), u32::try_from(end - start)) else {
            return Err(UpdateError::FlashEraseFailed);
        };
        platform.erase_range(partition, start, len).map_err(|err| {
            error!("erasing tail of {} failed: {}", partition.label, err);
            UpdateError::FlashEraseFailed
        })?;
        debug!("erased {} tail bytes of {}", len, partition.label);
        Ok(())
    }

    /// Erase the first sector again so a rejected image cannot boot
    fn scrub<P: FlashPlatform + ?Sized>(&mut self, platform: &mut P, sector_size: u32) {
        if !self.header_enabled {
            return;
        }
        let partition = &self.target.partition;
        let len = sector_size.min(partition.size - self.target.base_offset);
        match platform.erase_range(partition, self.target.base_offset, len) {
            Ok(()) => {
                debug!("scrubbed header of {}", partition.label);
                self.header_enabled = false;
            }
            Err(err) => error!("scrubbing {} failed: {}", partition.label, err),
        }
    }
}

/// Update session over a [`FlashPlatform`]
pub struct UpdateSession<P: FlashPlatform> {
    platform: P,
    config: UpdateConfig,
    active: Option<ActiveUpdate>,
    last_error: Option<UpdateError>,
    expected_checksum: Option<String>,
    expected_signature: Option<String>,
    progress_callback: Option<ProgressCallback>,
    status_pin: Option<Box<dyn StatusPin>>,
}

impl<P: FlashPlatform> std::fmt::Debug for UpdateSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSession")
            .field("config", &self.config)
            .field("active", &self.active)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<P: FlashPlatform> UpdateSession<P> {
    /// Session with the default configuration
    pub fn new(platform: P) -> Self {
        Self::with_config(platform, UpdateConfig::default())
    }

    /// Session with an explicit configuration
    pub fn with_config(platform: P, config: UpdateConfig) -> Self {
        Self {
            platform,
            config,
            active: None,
            last_error: None,
            expected_checksum: None,
            expected_signature: None,
            progress_callback: None,
            status_pin: None,
        }
    }

    /// Register a progress listener called with `(written, total)`
    pub fn on_progress(&mut self, callback: impl FnMut(u32, u32) + Send + 'static) -> &mut Self {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Attach the pin driven during stream reads
    pub fn with_status_pin(mut self, pin: Box<dyn StatusPin>) -> Self {
        self.status_pin = Some(pin);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Underlying platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Underlying platform, mutably; must not be used while a session runs
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Release the platform
    pub fn into_platform(self) -> P {
        self.platform
    }

    /// Start receiving an image of `size` bytes for `target`
    ///
    /// [`UpdateSize::UNKNOWN`] sizes the image to the whole target.
    pub fn begin(&mut self, size: u32, target: TargetKind) -> Result<(), UpdateError> {
        if self.active.is_some() {
            warn!("already running");
            return Err(UpdateError::AlreadyRunning);
        }
        self.last_error = None;

        if let Err(err) = self.config.validate() {
            error!("refusing to start: {}", err);
            return self.reject(UpdateError::BadArgument);
        }

        let size = UpdateSize::from(size);
        if size == UpdateSize::Known(0) {
            return self.reject(UpdateError::BadSize);
        }

        let resolved = match resolve_target(&self.platform, &target, &self.config) {
            Ok(resolved) => resolved,
            Err(err) => return self.reject(err),
        };

        let declared = match size {
            UpdateSize::Unknown => resolved.capacity,
            UpdateSize::Known(n) if n > resolved.capacity => {
                error!("too large {} > {}", n, resolved.capacity);
                return self.reject(UpdateError::BadSize);
            }
            UpdateSize::Known(n) => n,
        };
        if declared == 0 {
            return self.reject(UpdateError::BadSize);
        }

        let guard = target.is_firmware().then(|| self.guard());
        info!(
            "update started: {} bytes into {}",
            declared, resolved.partition.label
        );
        self.active = Some(ActiveUpdate {
            sector: SectorBuffer::new(self.config.sector_size as usize, guard),
            target: resolved,
            guard,
            declared,
            checksum: ImageChecksum::new(),
            header_enabled: false,
        });
        Ok(())
    }

    /// [`UpdateSession::begin`] with a numeric command code
    ///
    /// `0` selects firmware and `100` a data volume; anything else fails
    /// with [`UpdateError::BadArgument`].
    pub fn begin_command(
        &mut self,
        size: u32,
        command: i32,
        label: Option<&str>,
    ) -> Result<(), UpdateError> {
        if self.active.is_some() {
            warn!("already running");
            return Err(UpdateError::AlreadyRunning);
        }
        match TargetKind::from_command(command, label) {
            Ok(target) => self.begin(size, target),
            Err(err) => self.reject(err),
        }
    }

    /// Buffer `data`, flushing complete sectors
    ///
    /// Returns the bytes consumed. Returns 0 without effect when idle or
    /// after an error. Data that does not fit the declared size aborts the
    /// session with [`UpdateError::NotEnoughSpace`]. On a flash failure the
    /// count stops before the sector that failed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.last_error.is_some() {
            return 0;
        }
        let Some(room) = self.active.as_ref().map(ActiveUpdate::room) else {
            return 0;
        };
        if data.len() as u64 > u64::from(room) {
            error!("write of {} bytes exceeds remaining {}", data.len(), room);
            self.abort_with(UpdateError::NotEnoughSpace);
            return 0;
        }

        let mut consumed = 0;
        let mut failure = None;
        if let Some(active) = self.active.as_mut() {
            let callback = &mut self.progress_callback;
            let mut notify = |written: u32, total: u32| {
                if let Some(cb) = callback.as_mut() {
                    cb(written, total);
                }
            };
            while consumed < data.len() {
                let taken = active.sector.fill(&data[consumed..]);
                if active.should_flush()
                    && let Err(err) = active.flush(&mut self.platform, &mut notify)
                {
                    failure = Some(err);
                    break;
                }
                consumed += taken;
            }
        }

        if let Some(err) = failure {
            self.abort_with(err);
        }
        consumed
    }

    /// Pull the rest of the image from `source`
    ///
    /// Blocks while the source is silent, up to
    /// [`crate::StreamRetryPolicy::worst_case`] per read, then aborts with
    /// [`UpdateError::StreamTimeout`]. A stream that starts an executable
    /// image must begin with the image magic; otherwise the session aborts
    /// before anything is consumed.
    /// Returns the bytes written.
    pub fn write_stream<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> usize {
        if self.last_error.is_some() {
            return 0;
        }
        let Some(at_start) = self
            .active
            .as_ref()
            .map(|a| a.guard.is_some() && a.written() == 0 && a.sector.is_empty())
        else {
            return 0;
        };
        if at_start {
            let first = source.peek();
            if first != Some(self.config.image_magic) {
                warn!("stream does not start with an image header: {:?}", first);
                self.abort_with(UpdateError::BadMagicByte);
                return 0;
            }
        }

        let led = self.config.status_led;
        if led.enabled()
            && let Some(pin) = self.status_pin.as_mut()
        {
            pin.configure_output(led.pin);
        }

        let policy = self.config.stream_retry;
        let mut chunk = vec![0u8; self.config.sector_size as usize];
        let mut written = 0;

        loop {
            let room = match self.active.as_ref() {
                Some(active) => (active.room() as usize).min(active.sector.free()),
                None => break,
            };
            if room == 0 {
                break;
            }

            self.set_led(true);
            let Some(count) = stream::read_with_retry(source, &mut chunk[..room], &policy) else {
                error!("stream stalled for {} attempts", policy.max_attempts);
                self.abort_with(UpdateError::StreamTimeout);
                return written;
            };
            self.set_led(false);

            let mut outcome = Ok(());
            if let Some(active) = self.active.as_mut() {
                active.sector.fill(&chunk[..count]);
                if active.should_flush() {
                    let callback = &mut self.progress_callback;
                    outcome = active.flush(&mut self.platform, &mut |w: u32, t: u32| {
                        if let Some(cb) = callback.as_mut() {
                            cb(w, t);
                        }
                    });
                }
            }
            if let Err(err) = outcome {
                self.abort_with(err);
                return written;
            }
            written += count;
        }
        written
    }

    /// Verify and commit the image
    ///
    /// Without `even_if_remaining` an incomplete image aborts the session.
    /// With it, buffered bytes are flushed and the image ends where the
    /// data did. The checksum gate runs first, then the signature gate when
    /// a verification key is configured, then activation.
    pub fn end(&mut self, even_if_remaining: bool) -> Result<(), UpdateError> {
        if self.active.is_none() {
            return Err(self.last_error.unwrap_or(UpdateError::NotRunning));
        }
        match self.finish(even_if_remaining) {
            Ok(()) => {
                info!("update committed");
                self.reset();
                Ok(())
            }
            Err(err) => {
                self.abort_with(err);
                Err(err)
            }
        }
    }

    fn finish(&mut self, even_if_remaining: bool) -> Result<(), UpdateError> {
        let sector_size = self.config.sector_size;
        let active = self.active.as_mut().ok_or(UpdateError::NotRunning)?;

        if !active.is_finished() && !even_if_remaining {
            error!("premature end: {}/{}", active.written(), active.declared);
            return Err(UpdateError::Abort);
        }

        if even_if_remaining {
            let callback = &mut self.progress_callback;
            active.flush(&mut self.platform, &mut |w: u32, t: u32| {
                if let Some(cb) = callback.as_mut() {
                    cb(w, t);
                }
            })?;
            active.declared = active.written();
        }

        let digest = active.checksum.finalize_hex();
        debug!("image md5 {}", digest);
        if let Some(expected) = self.expected_checksum.as_deref()
            && expected != digest
        {
            error!("md5 mismatch: expected {}, got {}", expected, digest);
            return Err(UpdateError::ChecksumMismatch);
        }

        if let Some(key) = self.config.verification_key.as_deref() {
            active.erase_tail(&mut self.platform, sector_size)?;
            if !active.enable(&mut self.platform) {
                return Err(UpdateError::NoPartition);
            }
            let verdict = SignatureGate::new(key).check(
                &self.platform,
                &active.target.partition,
                self.expected_signature.as_deref(),
            );
            if let Err(err) = verdict {
                active.scrub(&mut self.platform, sector_size);
                return Err(err);
            }
        }

        if let Some(guard) = active.guard {
            let partition = active.target.partition.clone();
            if !active.enable(&mut self.platform)
                || !sector::is_bootable(&self.platform, &partition, guard)
            {
                active.scrub(&mut self.platform, sector_size);
                return Err(UpdateError::FlashReadFailed);
            }
            if let Err(err) = self.platform.set_boot_partition(&partition) {
                error!("activating {} failed: {}", partition.label, err);
                active.scrub(&mut self.platform, sector_size);
                return Err(UpdateError::ActivationFailed);
            }
            info!("boot partition is now {}", partition.label);
        }
        Ok(())
    }

    /// Cancel the running update
    pub fn abort(&mut self) {
        self.abort_with(UpdateError::Abort);
    }

    /// Expect the image MD5 to equal `hex` (32 hex digits)
    pub fn set_expected_checksum(&mut self, hex: &str) -> Result<(), UpdateError> {
        checksum::validate_expected(hex)?;
        self.expected_checksum = Some(hex.to_owned());
        Ok(())
    }

    /// Signature (hex) checked against the configured verification key
    pub fn set_expected_signature(&mut self, hex: impl Into<String>) {
        self.expected_signature = Some(hex.into());
    }

    /// Whether the alternate slot holds a bootable image
    pub fn can_roll_back(&self) -> bool {
        if self.active.is_some() {
            return false;
        }
        match self.platform.next_update_partition() {
            Some(partition) => sector::is_bootable(&self.platform, &partition, self.guard()),
            None => false,
        }
    }

    /// Boot the alternate slot next time, if it holds a bootable image
    pub fn roll_back(&mut self) -> bool {
        if self.active.is_some() {
            return false;
        }
        let Some(partition) = self.platform.next_update_partition() else {
            return false;
        };
        if !sector::is_bootable(&self.platform, &partition, self.guard()) {
            return false;
        }
        match self.platform.set_boot_partition(&partition) {
            Ok(()) => {
                info!("rolled back to {}", partition.label);
                true
            }
            Err(err) => {
                error!("roll back to {} failed: {}", partition.label, err);
                false
            }
        }
    }

    /// Bytes flushed to flash in the running update
    pub fn progress(&self) -> u32 {
        self.active.as_ref().map_or(0, ActiveUpdate::written)
    }

    /// Declared bytes not yet flushed
    pub fn remaining(&self) -> u32 {
        self.active
            .as_ref()
            .map_or(0, |active| active.declared - active.written())
    }

    /// Declared image size of the running update
    pub fn size(&self) -> u32 {
        self.active.as_ref().map_or(0, |active| active.declared)
    }

    /// Whether an update is running
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the running update has received all declared bytes
    pub fn is_finished(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveUpdate::is_finished)
    }

    /// Whether a sticky error is recorded
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Sticky error of the last update
    pub fn last_error(&self) -> Option<UpdateError> {
        self.last_error
    }

    /// Diagnostic string of the sticky error
    pub fn error_string(&self) -> &'static str {
        self.last_error.map_or(NO_ERROR, UpdateError::as_str)
    }

    /// Write the diagnostic string and a newline to `out`
    pub fn print_error(&self, out: &mut impl io::Write) -> io::Result<()> {
        writeln!(out, "{}", self.error_string())
    }

    fn guard(&self) -> HeaderGuard {
        HeaderGuard::from(&self.config)
    }

    fn reject(&mut self, err: UpdateError) -> Result<(), UpdateError> {
        warn!("update rejected: {}", err);
        self.last_error = Some(err);
        Err(err)
    }

    fn abort_with(&mut self, err: UpdateError) {
        warn!("update aborted: {}", err);
        self.reset();
        self.last_error = Some(err);
    }

    fn reset(&mut self) {
        if self.active.take().is_some() {
            self.set_led(false);
        }
        self.expected_checksum = None;
        self.expected_signature = None;
    }

    fn set_led(&mut self, on: bool) {
        let led = self.config.status_led;
        if !led.enabled() {
            return;
        }
        if let Some(pin) = self.status_pin.as_mut() {
            pin.set_level(led.pin, led.level(on));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DeviceLayout, MemoryFlash};
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    fn session() -> UpdateSession<MemoryFlash> {
        let config = UpdateConfig::default().with_verification_key(None);
        UpdateSession::with_config(
            MemoryFlash::new(DeviceLayout::standard(0x4000, 0x4000)),
            config,
        )
    }

    fn image(len: usize) -> Vec<u8> {
        let mut data: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        data[0] = 0xE9;
        data
    }

    #[test]
    fn test_begin_twice_is_refused_without_sticky_error() -> Result<(), UpdateError> {
        let mut session = session();
        session.begin(1024, TargetKind::Firmware)?;
        assert_eq!(
            session.begin(1024, TargetKind::Firmware),
            Err(UpdateError::AlreadyRunning)
        );
        assert!(!session.has_error());
        assert!(session.is_running());
        Ok(())
    }

    #[test]
    fn test_begin_size_checks() {
        let mut session = session();
        assert_eq!(session.begin(0, TargetKind::Firmware), Err(UpdateError::BadSize));
        assert_eq!(session.last_error(), Some(UpdateError::BadSize));
        assert_eq!(
            session.begin(0x4001, TargetKind::Firmware),
            Err(UpdateError::BadSize)
        );
        assert!(!session.is_running());
    }

    #[test]
    fn test_unknown_size_takes_capacity() -> Result<(), UpdateError> {
        let mut session = session();
        session.begin(UpdateSize::UNKNOWN, TargetKind::Firmware)?;
        assert_eq!(session.size(), 0x4000);
        assert_eq!(session.remaining(), 0x4000);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_refused_at_begin() {
        let mut config = UpdateConfig::default().with_verification_key(None);
        config.sector_size = 0;
        let mut session = UpdateSession::with_config(
            MemoryFlash::new(DeviceLayout::standard(0x4000, 0x4000)),
            config,
        );

        assert_eq!(
            session.begin(100, TargetKind::Firmware),
            Err(UpdateError::BadArgument)
        );
        assert!(!session.is_running());
        assert_eq!(session.write(&image(100)), 0);
        assert_eq!(session.last_error(), Some(UpdateError::BadArgument));
    }

    #[test]
    fn test_begin_command_rejects_unknown_code() {
        let mut session = session();
        assert_eq!(
            session.begin_command(1024, 42, None),
            Err(UpdateError::BadArgument)
        );
        assert_eq!(session.error_string(), "Bad Argument");
    }

    #[test]
    fn test_write_when_idle_consumes_nothing() {
        let mut session = session();
        assert_eq!(session.write(&image(16)), 0);
        assert!(!session.has_error());
    }

    #[test]
    fn test_flush_failure_reports_partial_consumption() -> Result<(), UpdateError> {
        let mut session = session();
        session.platform_mut().faults_mut().erase_after = Some(1);
        session.begin(0x3000, TargetKind::Firmware)?;

        let consumed = session.write(&image(0x3000));
        assert_eq!(consumed, 0x1000);
        assert_eq!(session.last_error(), Some(UpdateError::FlashEraseFailed));
        assert!(!session.is_running());
        Ok(())
    }

    #[test]
    fn test_progress_callback_sequence() -> Result<(), UpdateError> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut session = session();
        session.on_progress(move |written, total| {
            if let Ok(mut seen) = sink.lock() {
                seen.push((written, total));
            }
        });

        session.begin(5000, TargetKind::Firmware)?;
        assert_eq!(session.write(&image(5000)), 5000);
        session.end(false)?;

        let seen = seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, vec![(0, 5000), (4096, 5000), (5000, 5000)]);
        Ok(())
    }

    #[test]
    fn test_print_error() -> Result<(), UpdateError> {
        let mut session = session();
        let mut out = Vec::new();
        session
            .print_error(&mut out)
            .map_err(|_err| UpdateError::Abort)?;
        assert_eq!(out, b"No Error\n");

        session.abort();
        out.clear();
        session
            .print_error(&mut out)
            .map_err(|_err| UpdateError::Abort)?;
        assert_eq!(out, b"Aborted\n");
        Ok(())
    }

    #[test]
    #[traced_test]
    fn test_abort_is_logged() -> Result<(), UpdateError> {
        let mut session = session();
        session.begin(1024, TargetKind::Firmware)?;
        session.abort();
        assert!(logs_contain("update aborted: Aborted"));
        assert!(!session.is_running());
        Ok(())
    }
}
