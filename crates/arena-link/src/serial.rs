use anyhow::{anyhow, Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

use crate::transport::Link;

pub const DEFAULT_BAUD: u32 = 115_200;

/// I/O notifications from an open port, delivered to the control loop.
#[derive(Debug)]
pub enum LinkEvent {
    Received(Bytes),
    Written(usize),
    Closed(String),
}

/// Write side of the link as seen by the transport. Detached until a port
/// is attached.
#[derive(Debug, Default)]
pub struct SerialLink {
    writer: Option<mpsc::UnboundedSender<Bytes>>,
}

impl SerialLink {
    pub fn attach(&mut self, port: &SerialPort) {
        self.writer = Some(port.writer.clone());
    }

    pub fn detach(&mut self) {
        self.writer = None;
    }
}

impl Link for SerialLink {
    fn is_open(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| !w.is_closed())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_ref().context("serial port not attached")?;
        writer
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| anyhow!("serial writer stopped"))
    }
}

/// An open serial device, split into a reader task and a writer task.
/// Dropping it stops both.
pub struct SerialPort {
    name: String,
    writer: mpsc::UnboundedSender<Bytes>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl SerialPort {
    pub fn open(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud)
            .open_native_async()
            .with_context(|| format!("open serial device {}", dev))?;
        let (mut rd, mut wr) = tokio::io::split(port);

        let (ev_tx, events) = mpsc::unbounded_channel();
        let (writer, mut wr_rx) = mpsc::unbounded_channel::<Bytes>();

        let rd_events = ev_tx.clone();
        let reader_task = tokio::spawn(async move {
            let mut buf = BytesMut::with_capacity(1024);
            loop {
                match rd.read_buf(&mut buf).await {
                    Ok(0) => {
                        let _ = rd_events.send(LinkEvent::Closed("port closed".into()));
                        break;
                    }
                    Ok(_) => {
                        if rd_events.send(LinkEvent::Received(buf.split().freeze())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = rd_events.send(LinkEvent::Closed(format!("read failed: {}", e)));
                        break;
                    }
                }
            }
        });

        let writer_task = tokio::spawn(async move {
            while let Some(data) = wr_rx.recv().await {
                let res = async {
                    wr.write_all(&data).await?;
                    wr.flush().await
                }
                .await;
                match res {
                    Ok(()) => {
                        if ev_tx.send(LinkEvent::Written(data.len())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("serial write failed: {}", e);
                        let _ = ev_tx.send(LinkEvent::Closed(format!("write failed: {}", e)));
                        break;
                    }
                }
            }
        });

        info!("serial: opened {} @ {}", dev, baud);
        Ok(Self { name: dev.to_string(), writer, events, reader_task, writer_task })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}
