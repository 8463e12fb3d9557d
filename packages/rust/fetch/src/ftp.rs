//! FTP session over `suppaftp`.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use feedbuilder_shared::{FeedBuilderError, FtpConfig, FtpCredentials, Result};
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::{debug, info, instrument};

use crate::RemoteSource;

/// A logged-in FTP session.
///
/// The control connection is closed with `QUIT` when the session is dropped,
/// so holding it in a scope bounds the connection to that scope.
pub struct FtpSource {
    stream: Option<FtpStream>,
    address: String,
    remote_dir: String,
}

impl FtpSource {
    /// Connect, log in and switch to binary transfers.
    ///
    /// Fails with [`FeedBuilderError::Connection`] when the host cannot be
    /// resolved or reached, or when the server rejects the credentials.
    #[instrument(skip_all, fields(host = %credentials.host, port = credentials.port))]
    pub fn connect(credentials: &FtpCredentials, config: &FtpConfig) -> Result<Self> {
        let address = credentials.address();
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let socket = resolve(&address)?;

        let mut stream = FtpStream::connect_timeout(socket, timeout)
            .map_err(|e| FeedBuilderError::connection(format!("{address}: {e}")))?;

        stream
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|e| FeedBuilderError::connection(format!("{address}: {e}")))?;

        stream.set_mode(if config.passive {
            Mode::Passive
        } else {
            Mode::Active
        });

        stream
            .login(&credentials.user, &credentials.password)
            .map_err(|e| FeedBuilderError::connection(format!("{address}: login failed: {e}")))?;

        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| FeedBuilderError::connection(format!("{address}: TYPE I: {e}")))?;

        info!(%address, passive = config.passive, "ftp session open");

        Ok(Self {
            stream: Some(stream),
            address,
            remote_dir: config.remote_dir.clone(),
        })
    }
}

impl RemoteSource for FtpSource {
    fn describe(&self) -> String {
        format!("ftp://{}{}", self.address, self.remote_dir)
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>> {
        let path = remote_path(&self.remote_dir, name);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FeedBuilderError::connection("ftp session already closed"))?;

        let buffer = stream
            .retr_as_buffer(&path)
            .map_err(|e| FeedBuilderError::connection(format!("RETR {path}: {e}")))?;

        Ok(buffer.into_inner())
    }
}

impl Drop for FtpSource {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            match stream.quit() {
                Ok(()) => debug!(address = %self.address, "ftp session closed"),
                Err(e) => debug!(address = %self.address, error = %e, "ftp quit failed"),
            }
        }
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|e| FeedBuilderError::connection(format!("{address}: {e}")))?
        .next()
        .ok_or_else(|| FeedBuilderError::connection(format!("{address}: no address resolved")))
}

/// Join the remote directory and a listed file name.
pub(crate) fn remote_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
