//! SPS30 particulate matter sensor adapter (UART, SHDLC)
//!
//! Sensirion's SHDLC framing over 115200 8N1: frames are delimited by
//! 0x7E flags, the bytes {0x7E, 0x7D, 0x11, 0x13} are escaped as
//! `0x7D, byte ^ 0x20`, and the checksum is the bitwise complement of the
//! byte sum of the unstuffed content. Measured values arrive as ten
//! big-endian IEEE-754 floats; the first four are the mass concentrations
//! this rig reports.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use crate::domain::{Measurement, SensorKind};
use crate::ports::sensor::{SensorError, SensorPort};

const CMD_START_MEASUREMENT: u8 = 0x00;
const CMD_STOP_MEASUREMENT: u8 = 0x01;
const CMD_READ_MEASURED_VALUES: u8 = 0x03;
const CMD_DEVICE_INFO: u8 = 0xD0;
const CMD_RESET: u8 = 0xD3;

/// Device info subcommand: serial number (null-terminated ASCII).
const INFO_SERIAL_NUMBER: u8 = 0x03;
/// Start argument: subcommand 0x01, output format 0x03 (IEEE754 float).
const START_ARGS: [u8; 2] = [0x01, 0x03];

/// The fan takes about a second to spin up before data is available.
const SPINUP_WAIT: Duration = Duration::from_millis(1200);

/// SHDLC framing primitives, shared by the driver and `rigctl`.
pub mod shdlc {
    use crate::ports::sensor::SensorError;

    /// Frame delimiter.
    pub const FLAG: u8 = 0x7E;
    const ESCAPE: u8 = 0x7D;
    const ESCAPE_XOR: u8 = 0x20;

    fn needs_escape(byte: u8) -> bool {
        matches!(byte, 0x7E | 0x7D | 0x11 | 0x13)
    }

    /// Bitwise complement of the byte sum of the unstuffed content.
    pub fn checksum(content: &[u8]) -> u8 {
        !content.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    /// Build a complete MOSI frame (address 0) for `cmd` with `data`.
    pub fn encode_mosi(cmd: u8, data: &[u8]) -> Vec<u8> {
        let mut content = Vec::with_capacity(data.len() + 4);
        content.push(0x00); // device address, always 0 on the SPS30
        content.push(cmd);
        content.push(data.len() as u8);
        content.extend_from_slice(data);
        content.push(checksum(&content[..]));

        let mut frame = Vec::with_capacity(content.len() + 6);
        frame.push(FLAG);
        for byte in content {
            if needs_escape(byte) {
                frame.push(ESCAPE);
                frame.push(byte ^ ESCAPE_XOR);
            } else {
                frame.push(byte);
            }
        }
        frame.push(FLAG);
        frame
    }

    /// Undo byte stuffing on the content between two flags.
    pub fn unstuff(raw: &[u8]) -> Result<Vec<u8>, SensorError> {
        let mut out = Vec::with_capacity(raw.len());
        let mut iter = raw.iter();
        while let Some(&byte) = iter.next() {
            if byte == ESCAPE {
                let &next = iter.next().ok_or(SensorError::InvalidData)?;
                out.push(next ^ ESCAPE_XOR);
            } else {
                out.push(byte);
            }
        }
        Ok(out)
    }

    /// A decoded MISO (device to host) frame.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct MisoFrame {
        pub cmd: u8,
        /// Device state byte; non-zero is a device-reported error
        pub state: u8,
        pub data: Vec<u8>,
    }

    /// Decode unstuffed MISO content `[addr, cmd, state, len, data.., chk]`.
    pub fn decode_miso(content: &[u8]) -> Result<MisoFrame, SensorError> {
        if content.len() < 5 {
            return Err(SensorError::InvalidData);
        }
        let (body, chk) = content.split_at(content.len() - 1);
        if checksum(body) != chk[0] {
            return Err(SensorError::Crc);
        }
        let len = body[3] as usize;
        let data = &body[4..];
        if data.len() != len {
            return Err(SensorError::InvalidData);
        }
        Ok(MisoFrame {
            cmd: body[1],
            state: body[2],
            data: data.to_vec(),
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn start_measurement_frame_matches_datasheet() {
            // SPS30 datasheet, SHDLC example frame
            let frame = encode_mosi(0x00, &[0x01, 0x03]);
            assert_eq!(frame, vec![0x7E, 0x00, 0x00, 0x02, 0x01, 0x03, 0xF9, 0x7E]);
        }

        #[test]
        fn reserved_bytes_are_stuffed() {
            let frame = encode_mosi(0x80, &[0x7E]);
            // 0x7E in the payload becomes 0x7D 0x5E
            assert!(frame[1..frame.len() - 1]
                .windows(2)
                .any(|w| w == [0x7D, 0x5E]));
            // no bare flag inside the frame body
            assert!(!frame[1..frame.len() - 1].contains(&FLAG));
        }

        #[test]
        fn unstuff_reverses_stuffing() {
            assert_eq!(
                unstuff(&[0x01, 0x7D, 0x5E, 0x02]).unwrap(),
                vec![0x01, 0x7E, 0x02]
            );
        }

        #[test]
        fn unstuff_rejects_dangling_escape() {
            assert_eq!(
                unstuff(&[0x01, 0x7D]).unwrap_err(),
                SensorError::InvalidData
            );
        }

        #[test]
        fn decode_miso_happy_path() {
            // addr 0, cmd 0, state 0, len 0 -> chk 0xFF
            let frame = decode_miso(&[0x00, 0x00, 0x00, 0x00, 0xFF]).unwrap();
            assert_eq!(
                frame,
                MisoFrame {
                    cmd: 0x00,
                    state: 0x00,
                    data: vec![],
                }
            );
        }

        #[test]
        fn decode_miso_rejects_bad_checksum() {
            assert_eq!(
                decode_miso(&[0x00, 0x00, 0x00, 0x00, 0x00]).unwrap_err(),
                SensorError::Crc
            );
        }

        #[test]
        fn decode_miso_rejects_length_mismatch() {
            let mut content = vec![0x00, 0x03, 0x00, 0x05, 0xAA];
            content.push(checksum(&content));
            assert_eq!(decode_miso(&content).unwrap_err(), SensorError::InvalidData);
        }
    }
}

/// Mass concentrations plus the diagnostic tail of a measured-values
/// response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PmValues {
    pub pm1_0: f32,
    pub pm2_5: f32,
    pub pm4_0: f32,
    pub pm10_0: f32,
    /// Typical particle size in um
    pub typical_size: f32,
}

/// SPS30 driver over any serial byte stream.
///
/// `P` is `Box<dyn serialport::SerialPort>` in production and an
/// in-memory duplex in tests.
pub struct Sps30<P> {
    port: P,
    started: bool,
}

impl<P: Read + Write> Sps30<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            started: false,
        }
    }

    /// One command/response exchange.
    fn transact(&mut self, cmd: u8, data: &[u8]) -> Result<shdlc::MisoFrame, SensorError> {
        let frame = shdlc::encode_mosi(cmd, data);
        self.port.write_all(&frame).map_err(SensorError::bus)?;
        self.port.flush().map_err(SensorError::bus)?;

        let content = self.read_frame()?;
        let unstuffed = shdlc::unstuff(&content)?;
        let miso = shdlc::decode_miso(&unstuffed)?;
        if miso.cmd != cmd {
            return Err(SensorError::InvalidData);
        }
        if miso.state != 0 {
            return Err(SensorError::Device(miso.state & 0x7F));
        }
        Ok(miso)
    }

    /// Collect the bytes between the next pair of flags.
    fn read_frame(&mut self) -> Result<Vec<u8>, SensorError> {
        let mut content = Vec::new();
        let mut in_frame = false;
        let mut byte = [0u8; 1];
        // bounded by bytes, not wall time; the port timeout does the rest
        for _ in 0..4096 {
            match self.port.read(&mut byte) {
                Ok(0) => return Err(SensorError::Timeout),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(SensorError::Timeout)
                }
                Err(e) => return Err(SensorError::bus(e)),
            }
            match (in_frame, byte[0]) {
                (false, shdlc::FLAG) => in_frame = true,
                (false, _) => {} // garbage before the frame, skip
                (true, shdlc::FLAG) if content.is_empty() => {} // back-to-back flags
                (true, shdlc::FLAG) => return Ok(content),
                (true, b) => content.push(b),
            }
        }
        Err(SensorError::InvalidData)
    }

    /// Start measurement in float output format.
    pub fn start_measurement(&mut self) -> Result<(), SensorError> {
        self.transact(CMD_START_MEASUREMENT, &START_ARGS)?;
        self.started = true;
        Ok(())
    }

    /// Stop measurement, idling the fan.
    pub fn stop_measurement(&mut self) -> Result<(), SensorError> {
        self.transact(CMD_STOP_MEASUREMENT, &[])?;
        self.started = false;
        Ok(())
    }

    /// Soft-reset the device.
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.transact(CMD_RESET, &[])?;
        self.started = false;
        Ok(())
    }

    /// Device serial number (ASCII).
    pub fn serial_number(&mut self) -> Result<String, SensorError> {
        let miso = self.transact(CMD_DEVICE_INFO, &[INFO_SERIAL_NUMBER])?;
        let end = miso.data.iter().position(|&b| b == 0).unwrap_or(miso.data.len());
        String::from_utf8(miso.data[..end].to_vec()).map_err(|_| SensorError::InvalidData)
    }

    /// Fetch one set of measured values.
    ///
    /// An empty payload means no new measurement was ready yet; that is
    /// reported as a timeout so the retry policy treats it as transient.
    pub fn read_measured(&mut self) -> Result<PmValues, SensorError> {
        let miso = self.transact(CMD_READ_MEASURED_VALUES, &[])?;
        if miso.data.is_empty() {
            return Err(SensorError::Timeout);
        }
        if miso.data.len() != 40 {
            return Err(SensorError::InvalidData);
        }
        let f = |i: usize| {
            let mut be = [0u8; 4];
            be.copy_from_slice(&miso.data[i * 4..i * 4 + 4]);
            f32::from_be_bytes(be)
        };
        // layout: mass pm1.0/2.5/4.0/10, number nc0.5..nc10, typical size
        Ok(PmValues {
            pm1_0: f(0),
            pm2_5: f(1),
            pm4_0: f(2),
            pm10_0: f(3),
            typical_size: f(9),
        })
    }
}

impl Sps30<Box<dyn serialport::SerialPort>> {
    /// Open the named serial port with SPS30 settings and wrap it.
    pub fn open(path: &str, baud: u32) -> Result<Self, SensorError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(SensorError::bus)?;
        Ok(Sps30::new(port))
    }
}

impl<P: Read + Write + Send> SensorPort for Sps30<P> {
    fn kind(&self) -> SensorKind {
        SensorKind::Particulates
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        self.serial_number().map(|_| ()).map_err(|e| match e {
            SensorError::Timeout => SensorError::NotDetected,
            other => other,
        })
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        if !self.started {
            match self.start_measurement() {
                Ok(()) => thread::sleep(SPINUP_WAIT),
                // the device refuses start while it is already measuring,
                // e.g. when a previous run never sent stop; its values
                // are ready to read as-is
                Err(SensorError::Device(_)) => self.started = true,
                Err(e) => return Err(e),
            }
        }
        let pm = self.read_measured()?;
        Ok(Measurement::Particulates {
            pm1_0: pm.pm1_0,
            pm2_5: pm.pm2_5,
            pm4_0: pm.pm4_0,
            pm10_0: pm.pm10_0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory serial duplex: reads from a canned response buffer,
    /// collects writes for inspection.
    struct Loopback {
        rx: io::Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Loopback {
        fn with_response(frames: &[Vec<u8>]) -> Self {
            Self {
                rx: io::Cursor::new(frames.concat()),
                tx: Vec::new(),
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.read(buf) {
                Ok(0) => Err(io::Error::new(io::ErrorKind::TimedOut, "no more data")),
                other => other,
            }
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Build a stuffed MISO frame for tests.
    fn miso(cmd: u8, state: u8, data: &[u8]) -> Vec<u8> {
        let mut content = vec![0x00, cmd, state, data.len() as u8];
        content.extend_from_slice(data);
        content.push(shdlc::checksum(&content));
        let mut frame = vec![shdlc::FLAG];
        for b in content {
            match b {
                0x7E | 0x7D | 0x11 | 0x13 => {
                    frame.push(0x7D);
                    frame.push(b ^ 0x20);
                }
                b => frame.push(b),
            }
        }
        frame.push(shdlc::FLAG);
        frame
    }

    #[test]
    fn read_measured_decodes_floats() {
        let values = [1.5f32, 2.5, 3.5, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.45];
        let mut payload = Vec::new();
        for v in values {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let port = Loopback::with_response(&[miso(CMD_READ_MEASURED_VALUES, 0, &payload)]);
        let mut sensor = Sps30::new(port);

        let pm = sensor.read_measured().unwrap();
        assert_eq!(pm.pm1_0, 1.5);
        assert_eq!(pm.pm2_5, 2.5);
        assert_eq!(pm.pm4_0, 3.5);
        assert_eq!(pm.pm10_0, 10.0);
        assert!((pm.typical_size - 0.45).abs() < 1e-6);
        // the request on the wire is a well-formed MOSI frame
        assert_eq!(
            sensor.port.tx,
            shdlc::encode_mosi(CMD_READ_MEASURED_VALUES, &[])
        );
    }

    #[test]
    fn empty_payload_is_reported_transient() {
        let port = Loopback::with_response(&[miso(CMD_READ_MEASURED_VALUES, 0, &[])]);
        let mut sensor = Sps30::new(port);
        assert_eq!(sensor.read_measured().unwrap_err(), SensorError::Timeout);
    }

    #[test]
    fn device_state_maps_to_device_error() {
        let port = Loopback::with_response(&[miso(CMD_START_MEASUREMENT, 0x43, &[])]);
        let mut sensor = Sps30::new(port);
        assert_eq!(
            sensor.start_measurement().unwrap_err(),
            SensorError::Device(0x43)
        );
    }

    #[test]
    fn read_recovers_when_already_measuring() {
        // start refused with a state error, as after a restart that
        // never sent stop, then a valid measurement frame
        let values = [1.5f32, 2.5, 3.5, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.45];
        let mut payload = Vec::new();
        for v in values {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let port = Loopback::with_response(&[
            miso(CMD_START_MEASUREMENT, 0x43, &[]),
            miso(CMD_READ_MEASURED_VALUES, 0, &payload),
        ]);
        let mut sensor = Sps30::new(port);

        match sensor.read().unwrap() {
            Measurement::Particulates { pm2_5, pm10_0, .. } => {
                assert_eq!(pm2_5, 2.5);
                assert_eq!(pm10_0, 10.0);
            }
            other => panic!("unexpected measurement: {other:?}"),
        }
        assert!(sensor.started, "port must be marked as measuring");
        // one start attempt, then straight to read-measured
        let mut expected = shdlc::encode_mosi(CMD_START_MEASUREMENT, &START_ARGS);
        expected.extend(shdlc::encode_mosi(CMD_READ_MEASURED_VALUES, &[]));
        assert_eq!(sensor.port.tx, expected);
    }

    #[test]
    fn serial_number_strips_terminator() {
        let port = Loopback::with_response(&[miso(CMD_DEVICE_INFO, 0, b"A1B2C3\0")]);
        let mut sensor = Sps30::new(port);
        assert_eq!(sensor.serial_number().unwrap(), "A1B2C3");
    }

    #[test]
    fn silent_port_times_out() {
        let port = Loopback::with_response(&[]);
        let mut sensor = Sps30::new(port);
        assert_eq!(sensor.read_measured().unwrap_err(), SensorError::Timeout);
    }
}
