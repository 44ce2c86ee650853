/*!
Serial port adapter.

Opens the USB-TTL device in raw 8N1 mode with no flow control and hands out
independent reader and writer handles for the receive and transmit threads.
*/

use crate::config::SerialConfig;
use mcu_link::{LinkError, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

/// Open port split into its read and write halves
pub struct SerialLink {
    pub reader: Box<dyn SerialPort>,
    pub writer: Box<dyn SerialPort>,
}

/// Open and configure the MCU serial device
///
/// Failure here is fatal: without the port there is no transport.
pub fn open(config: &SerialConfig) -> Result<SerialLink> {
    info!("🔌 Opening {} at {} baud", config.port, config.baud_rate);

    let writer = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.read_timeout())
        .open()
        .map_err(|e| LinkError::port_open(&config.port, e))?;

    let reader = writer
        .try_clone()
        .map_err(|e| LinkError::port_open(&config.port, e))?;

    // Stale bytes from before we opened would only desync the first frame.
    reader
        .clear(serialport::ClearBuffer::All)
        .map_err(|e| LinkError::port_open(&config.port, e))?;

    info!("✅ Serial port ready");
    Ok(SerialLink { reader, writer })
}

/// Description of an available serial device
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial devices present on this host
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| LinkError::config(format!("Cannot enumerate serial ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let kind = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => format!(
                    "USB {:04x}:{:04x} {}",
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                serialport::SerialPortType::PciPort => "PCI".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                serialport::SerialPortType::Unknown => "Unknown".to_string(),
            };
            PortInfo { name: p.port_name, kind }
        })
        .collect())
}
