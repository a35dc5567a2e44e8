// HTTP server for the configuration portal
//
// One connection at a time on port 80: read until a full request has
// arrived, route it through `portal::handle`, write the reply, close.
// Returns once a submission was saved, after the reply went out.

use embassy_net::tcp::{self, TcpSocket};
use embassy_net::{IpListenEndpoint, Stack};
use embassy_time::{Duration, Timer};

use crate::portal::{self, HttpError, PORT, REQUEST_BUF, http};
use crate::provisioning::{Provisioner, Restart};
use crate::store::KvStore;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve the portal until a restart is due.
pub async fn serve<S: KvStore>(stack: Stack<'_>, provisioner: &mut Provisioner<S>) -> Restart {
    let mut rx_buf = [0u8; 1536];
    let mut tx_buf = [0u8; 1536];
    let mut request = [0u8; REQUEST_BUF];

    stack.wait_config_up().await;
    log::info!("portal: listening on port {}", PORT);
    loop {
        if let Some(restart) =
            serve_one_request(stack, provisioner, &mut rx_buf, &mut tx_buf, &mut request).await
        {
            return restart;
        }
    }
}

async fn serve_one_request<S: KvStore>(
    stack: Stack<'_>,
    provisioner: &mut Provisioner<S>,
    rx_buf: &mut [u8],
    tx_buf: &mut [u8],
    request: &mut [u8],
) -> Option<Restart> {
    let mut socket = TcpSocket::new(stack, rx_buf, tx_buf);
    socket.set_timeout(Some(SOCKET_TIMEOUT));

    if socket
        .accept(IpListenEndpoint {
            addr: None,
            port: PORT,
        })
        .await
        .is_err()
    {
        Timer::after(Duration::from_millis(200)).await;
        return None;
    }

    let cap = request.len();
    let mut pos = 0usize;
    while pos < cap {
        match socket.read(&mut request[pos..]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => pos += n,
        }
        if !matches!(
            http::parse(&request[..pos], cap),
            Err(HttpError::Incomplete)
        ) {
            break;
        }
    }

    let (response, restart) = match http::parse(&request[..pos], cap) {
        Ok(req) => portal::handle(provisioner, &req),
        Err(e) => (portal::reject(e), None),
    };

    if let Err(e) = send_all(&mut socket, &response.encode()).await {
        log::warn!("portal: reply not sent: {:?}", e);
    }

    Timer::after(Duration::from_millis(50)).await;
    socket.close();
    Timer::after(Duration::from_millis(50)).await;
    socket.abort();

    restart
}

async fn send_all(socket: &mut TcpSocket<'_>, mut data: &[u8]) -> Result<(), tcp::Error> {
    while !data.is_empty() {
        let n = socket.write(data).await?;
        if n == 0 {
            break;
        }
        data = &data[n..];
    }
    socket.flush().await
}
