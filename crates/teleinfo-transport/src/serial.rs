use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{DataBits, Parity, SerialConfig, StopBits};
use crate::error::{Result, TransportError};

/// A tty device configured for raw, blocking reads.
///
/// The original terminal attributes are restored by [`SerialPort::close`], or on drop
/// when `close` was never called.
pub struct SerialPort {
    file: File,
    path: PathBuf,
    config: SerialConfig,
    original: Option<libc::termios>,
}

impl SerialPort {
    /// Open `path` and apply `config` to the line.
    ///
    /// The device is opened with `O_NOCTTY | O_NONBLOCK` so that a missing carrier
    /// does not block the open; blocking mode is restored once `CLOCAL` is set.
    pub fn open(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        let fd = file.as_raw_fd();

        // SAFETY: `fd` is an open descriptor owned by `file` for the whole call.
        if unsafe { libc::isatty(fd) } != 1 {
            return Err(TransportError::NotATerminal { path });
        }

        // SAFETY: termios is a plain C struct; an all-zero value is valid storage
        // for tcgetattr to fill in.
        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is a terminal and `original` is a valid writable termios.
        if unsafe { libc::tcgetattr(fd, &mut original) } != 0 {
            return Err(configure_error(&path));
        }

        let mut settings = original;
        apply(config, &mut settings)?;

        // SAFETY: `settings` is a fully initialized termios derived from tcgetattr.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &settings) } != 0 {
            return Err(configure_error(&path));
        }

        clear_nonblocking(fd).map_err(|source| TransportError::Configure {
            path: path.clone(),
            source,
        })?;

        // Drop whatever accumulated in the driver before we took over the line.
        // SAFETY: `fd` is an open terminal descriptor.
        unsafe { libc::tcflush(fd, libc::TCIFLUSH) };

        debug!(?path, line = %config, "serial port opened");

        Ok(Self {
            file,
            path,
            config: config.clone(),
            original: Some(original),
        })
    }

    /// Device path this port was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Line configuration applied at open.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Restore the original terminal attributes and release the device.
    pub fn close(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };
        // SAFETY: `original` was produced by tcgetattr on this same descriptor.
        if unsafe { libc::tcsetattr(self.file.as_raw_fd(), libc::TCSANOW, &original) } != 0 {
            return Err(configure_error(&self.path));
        }
        debug!(path = ?self.path, "serial port closed");
        Ok(())
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(path = ?self.path, %err, "failed to restore terminal attributes");
        }
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

/// Raw mode, blocking reads of at least one byte, framing from `config`.
pub(crate) fn apply(config: &SerialConfig, tio: &mut libc::termios) -> Result<()> {
    let speed = baud_to_speed(config.baud_rate)?;

    // SAFETY: `tio` is a valid, exclusively borrowed termios.
    unsafe { libc::cfmakeraw(tio) };

    tio.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::PARODD | libc::CSTOPB | libc::CRTSCTS);
    tio.c_cflag |= libc::CREAD | libc::CLOCAL;
    tio.c_cflag |= match config.data_bits {
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };
    match config.parity {
        Parity::None => {}
        Parity::Even => {
            tio.c_cflag |= libc::PARENB;
            tio.c_iflag |= libc::INPCK;
        }
        Parity::Odd => {
            tio.c_cflag |= libc::PARENB | libc::PARODD;
            tio.c_iflag |= libc::INPCK;
        }
    }
    if config.stop_bits == StopBits::Two {
        tio.c_cflag |= libc::CSTOPB;
    }

    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is valid and `speed` is a termios speed constant.
    unsafe {
        libc::cfsetispeed(tio, speed);
        libc::cfsetospeed(tio, speed);
    }
    Ok(())
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        other => return Err(TransportError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}

fn clear_nonblocking(fd: libc::c_int) -> std::io::Result<()> {
    // SAFETY: F_GETFL/F_SETFL on an open descriptor only touch its status flags.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

fn configure_error(path: &Path) -> TransportError {
    TransportError::Configure {
        path: path.to_path_buf(),
        source: std::io::Error::last_os_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_termios() -> libc::termios {
        // SAFETY: termios is a plain C struct, zero is a valid bit pattern.
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn apply_sets_seven_even_one() {
        let mut tio = blank_termios();
        apply(&SerialConfig::default(), &mut tio).unwrap();

        assert_eq!(tio.c_cflag & libc::CSIZE, libc::CS7);
        assert_ne!(tio.c_cflag & libc::PARENB, 0);
        assert_eq!(tio.c_cflag & libc::PARODD, 0);
        assert_eq!(tio.c_cflag & libc::CSTOPB, 0);
        assert_ne!(tio.c_cflag & libc::CREAD, 0);
        assert_ne!(tio.c_cflag & libc::CLOCAL, 0);
        assert_ne!(tio.c_iflag & libc::INPCK, 0);
        assert_eq!(tio.c_cc[libc::VMIN], 1);
        assert_eq!(tio.c_cc[libc::VTIME], 0);

        // SAFETY: `tio` is initialized.
        let (ispeed, ospeed) = unsafe { (libc::cfgetispeed(&tio), libc::cfgetospeed(&tio)) };
        assert_eq!(ispeed, libc::B1200);
        assert_eq!(ospeed, libc::B1200);
    }

    #[test]
    fn apply_clears_previous_framing() {
        let mut tio = blank_termios();
        tio.c_cflag = libc::CS8 | libc::PARODD | libc::CSTOPB | libc::CRTSCTS;
        apply(&SerialConfig::default(), &mut tio).unwrap();

        assert_eq!(tio.c_cflag & libc::CSIZE, libc::CS7);
        assert_eq!(tio.c_cflag & libc::PARODD, 0);
        assert_eq!(tio.c_cflag & libc::CSTOPB, 0);
        assert_eq!(tio.c_cflag & libc::CRTSCTS, 0);
    }

    #[test]
    fn apply_eight_none_two() {
        let cfg = SerialConfig {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::Two,
        };
        let mut tio = blank_termios();
        apply(&cfg, &mut tio).unwrap();

        assert_eq!(tio.c_cflag & libc::CSIZE, libc::CS8);
        assert_eq!(tio.c_cflag & libc::PARENB, 0);
        assert_ne!(tio.c_cflag & libc::CSTOPB, 0);
    }

    #[test]
    fn unsupported_baud_rate_is_rejected() {
        let mut tio = blank_termios();
        let config = SerialConfig::default().with_baud_rate(1234);
        let err = apply(&config, &mut tio).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedBaudRate(1234)));
    }

    #[test]
    fn open_missing_device_fails() {
        let name = format!("teleinfo-missing-tty-{}", std::process::id());
        let path = std::env::temp_dir().join(name);
        let err = SerialPort::open(&path, &SerialConfig::default()).unwrap_err();
        let TransportError::Open { ref source, .. } = err else {
            panic!("expected an open error, got {err:?}");
        };
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn open_non_terminal_fails() {
        let err = SerialPort::open("/dev/null", &SerialConfig::default()).unwrap_err();
        assert!(matches!(err, TransportError::NotATerminal { .. }));
    }
}
