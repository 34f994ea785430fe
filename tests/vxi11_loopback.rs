// End-to-end runs against a fake MXO that speaks portmapper + VXI-11 core on localhost

use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mxo_capture::capture;
use mxo_capture::config::CaptureConfig;
use mxo_capture::error::{DeviceError, Error};
use mxo_capture::rpc::port_mapping::{PMAPPROC_GETPORT, PMAP_PROG};
use mxo_capture::rpc::tcp_clients::{read_record, write_record};
use mxo_capture::rpc::xdr_pack::pack_replyheader;
use mxo_capture::rpc::xdr_unpack::unpack_callheader;
use mxo_capture::rpc::{IPPROTO_TCP, PROC_UNAVAIL, SUCCESS};
use mxo_capture::vxi11::xdr_pack::{pack_create_link_resp, pack_device_error, pack_device_read_resp, pack_device_read_stb_resp, pack_device_write_resp};
use mxo_capture::vxi11::{self as vx, CoreClient, REASON_END, REASON_REQCNT};
use mxo_capture::xdr::{Packer, Unpacker};

const LINK_ID: i32 = 17;
// Small on purpose so responses come back over several DEVICE_READ calls
const MAX_READ_CHUNK: usize = 64;
const SAMPLES: usize = 250;

#[derive(Default)]
struct ScopeLog {
    commands: Vec<String>,
    link_destroyed: bool,
    cleared: bool,
    stalled_reads: usize,
}

fn waveform_text() -> String {
    let values: Vec<String> = (0..SAMPLES).map(|i| format!("{:.4}", (i as f64 * 0.1).sin())).collect();
    values.join(",") + "\n"
}

fn respond_to(cmd: &str) -> Option<String> {
    if !cmd.ends_with('?') {
        return None;
    }
    let ans = match cmd {
        "*IDN?"                 => "Rohde&Schwarz,MXO4,1335.5050k04/111986,1.3.2.0\n".to_owned(),
        "FORM ASC;:CHAN1:DATA?" => waveform_text(),
        "CHAN1:DATA:XINC?"      => "1E-6\n".to_owned(),
        "CHAN1:DATA:XOR?"       => "-1.25E-4\n".to_owned(),
        "SYST:ERR?"             => "0,\"No error\"\n".to_owned(),
        c if c.ends_with("*OPC?") => "1\n".to_owned(),
        _                       => "0\n".to_owned(),
    };
    Some(ans)
}

fn spawn_portmapper(core_port: u16) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut unpacker = Unpacker::new();
        let mut packer = Packer::new();

        while let Ok(record) = read_record(&mut stream) {
            unpacker.reset(&record);
            let hdr = unpack_callheader(&mut unpacker).unwrap();
            assert_eq!(hdr.prog, PMAP_PROG);
            assert_eq!(hdr.prc, PMAPPROC_GETPORT);

            let prog = unpacker.unpack_u32().unwrap();
            let vers = unpacker.unpack_u32().unwrap();
            let prot = unpacker.unpack_u32().unwrap();
            unpacker.unpack_u32().unwrap();

            let registered = prog == vx::DEVICE_CORE_PROG && vers == vx::DEVICE_CORE_VERS && prot == IPPROTO_TCP;

            packer.reset();
            pack_replyheader(&mut packer, hdr.xid, SUCCESS).unwrap();
            packer.pack_u32(if registered { core_port as u32 } else { 0 }).unwrap();
            write_record(&mut stream, packer.get_buf()).unwrap();
        }
    });

    (port, handle)
}

fn serve_core(mut stream: TcpStream, log: Arc<Mutex<ScopeLog>>) {
    let mut unpacker = Unpacker::new();
    let mut packer = Packer::new();
    let mut incoming: Vec<u8> = vec![];
    let mut outgoing: Vec<u8> = vec![];
    // After STALL? every read says "more to come" and hands back nothing
    let mut stalled = false;

    while let Ok(record) = read_record(&mut stream) {
        unpacker.reset(&record);
        let hdr = unpack_callheader(&mut unpacker).unwrap();
        assert_eq!(hdr.prog, vx::DEVICE_CORE_PROG);

        packer.reset();
        let accept = if matches!(hdr.prc, vx::CREATE_LINK | vx::DEVICE_WRITE | vx::DEVICE_READ | vx::DEVICE_READSTB | vx::DEVICE_CLEAR | vx::DESTROY_LINK) {
            SUCCESS
        } else {
            PROC_UNAVAIL
        };
        pack_replyheader(&mut packer, hdr.xid, accept).unwrap();

        match hdr.prc {
            vx::CREATE_LINK => {
                unpacker.unpack_i32().unwrap();
                unpacker.unpack_bool().unwrap();
                unpacker.unpack_u32().unwrap();
                let device = unpacker.unpack_string().unwrap();
                let error = if device == "inst0" { 0 } else { DeviceError::InvalidAddress.code() };
                pack_create_link_resp(&mut packer, error, LINK_ID, 0, 1024).unwrap();
            },
            vx::DEVICE_WRITE => {
                let link = unpacker.unpack_i32().unwrap();
                unpacker.unpack_u32().unwrap();
                unpacker.unpack_u32().unwrap();
                let flags = unpacker.unpack_i32().unwrap();
                let data = unpacker.unpack_variable_len_opaque().unwrap();
                if link != LINK_ID {
                    pack_device_write_resp(&mut packer, DeviceError::InvalidLink.code(), 0).unwrap();
                } else {
                    incoming.extend_from_slice(&data);
                    if flags & vx::OPERATION_FLAGS_END_ONLY != 0 {
                        let cmd = String::from_utf8(incoming.split_off(0)).unwrap().trim_end().to_owned();
                        stalled = cmd == "STALL?";
                        if let Some(ans) = respond_to(&cmd) {
                            outgoing.extend_from_slice(ans.as_bytes());
                        }
                        log.lock().unwrap().commands.push(cmd);
                    }
                    pack_device_write_resp(&mut packer, 0, data.len() as u32).unwrap();
                }
            },
            vx::DEVICE_READ => {
                unpacker.unpack_i32().unwrap();
                let request_size = unpacker.unpack_u32().unwrap() as usize;
                if stalled {
                    log.lock().unwrap().stalled_reads += 1;
                    pack_device_read_resp(&mut packer, 0, REASON_REQCNT, &[]).unwrap();
                } else if outgoing.is_empty() {
                    pack_device_read_resp(&mut packer, DeviceError::IoTimeout.code(), 0, &[]).unwrap();
                } else {
                    let n = outgoing.len().min(request_size).min(MAX_READ_CHUNK);
                    let chunk: Vec<u8> = outgoing.drain(..n).collect();
                    let reason = if outgoing.is_empty() { REASON_END } else { REASON_REQCNT };
                    pack_device_read_resp(&mut packer, 0, reason, &chunk).unwrap();
                }
            },
            vx::DEVICE_READSTB => {
                pack_device_read_stb_resp(&mut packer, 0, if outgoing.is_empty() { 0 } else { 0x10 }).unwrap();
            },
            vx::DEVICE_CLEAR => {
                incoming.clear();
                outgoing.clear();
                log.lock().unwrap().cleared = true;
                pack_device_error(&mut packer, 0).unwrap();
            },
            vx::DESTROY_LINK => {
                let link = unpacker.unpack_i32().unwrap();
                log.lock().unwrap().link_destroyed = link == LINK_ID;
                pack_device_error(&mut packer, 0).unwrap();
            },
            _ => {},
        }

        write_record(&mut stream, packer.get_buf()).unwrap();
    }
}

struct FakeScope {
    pmap_port: u16,
    log: Arc<Mutex<ScopeLog>>,
    threads: Vec<JoinHandle<()>>,
}

impl FakeScope {
    fn start() -> Self {
        let core = TcpListener::bind("127.0.0.1:0").unwrap();
        let core_port = core.local_addr().unwrap().port();
        let log = Arc::new(Mutex::new(ScopeLog::default()));

        let core_log = Arc::clone(&log);
        let core_thread = thread::spawn(move || {
            let (stream, _) = core.accept().unwrap();
            serve_core(stream, core_log);
        });
        let (pmap_port, pmap_thread) = spawn_portmapper(core_port);

        FakeScope { pmap_port, log, threads: vec![core_thread, pmap_thread] }
    }

    fn join(self) -> Arc<Mutex<ScopeLog>> {
        for t in self.threads {
            t.join().unwrap();
        }
        self.log
    }
}

#[test]
fn capture_run_against_loopback_scope() {
    let scope = FakeScope::start();
    let dir = tempfile::tempdir().unwrap();

    let mut cfg = CaptureConfig::default();
    cfg.resource = "TCPIP0::127.0.0.1::inst0::INSTR".to_owned();
    cfg.portmapper_port = scope.pmap_port;
    cfg.timeout_ms = 5000;
    cfg.status_checking = true;
    cfg.output.csv_path = dir.path().join("waveform_data.csv");
    cfg.output.plot_path = Some(dir.path().join("waveform.svg"));

    let report = capture::run(&cfg).unwrap();
    assert_eq!(report.samples, SAMPLES);

    let log = scope.join();
    let log = log.lock().unwrap();
    assert!(log.link_destroyed);

    let sent: Vec<&str> = log.commands.iter().map(|s| s.as_str()).filter(|c| *c != "SYST:ERR?").collect();
    assert_eq!(sent, vec![
        "*IDN?",
        "*RST",
        "*OPC?",
        "TIM:ACQT 0.12",
        "CHAN1:RANG 8",
        "CHAN1:OFFS 0",
        "CHAN1:COUP ACL",
        "CHAN1:STAT ON",
        "TRIG:A:MODE AUTO",
        "TRIG:A:TYPE EDGE;:TRIG:A:EDGE:SLOP POS",
        "TRIG:A:SOUR CH1",
        "TRIG:A:LEV1 0",
        "*OPC?",
        "SINGle;*OPC?",
        "FORM ASC;:CHAN1:DATA?",
        "CHAN1:DATA:XINC?",
        "CHAN1:DATA:XOR?",
    ]);

    let mut rdr = csv::Reader::from_path(dir.path().join("waveform_data.csv")).unwrap();
    assert_eq!(rdr.headers().unwrap(), vec!["Time (s)", "Voltage (V)"]);
    let rows: Vec<(f64, f64)> = rdr.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), SAMPLES);
    for (i, (t, _)) in rows.iter().enumerate() {
        assert!((t - (i as f64 * 1e-6 - 1.25e-4)).abs() < 1e-12);
    }
    assert!(dir.path().join("waveform.svg").exists());
}

#[test]
fn core_client_link_lifecycle() {
    let scope = FakeScope::start();

    let mut core = CoreClient::with_portmapper("127.0.0.1", scope.pmap_port, Duration::from_secs(5)).unwrap();
    assert!(matches!(core.write(b"*IDN?\n"), Err(Error::Link(_))));

    let link = core.create_link("inst0").unwrap();
    assert_eq!(link.link_id, LINK_ID);
    assert!(core.create_link("inst0").is_err());

    let idn = core.ask(b"*IDN?\n").unwrap();
    assert_eq!(idn, b"Rohde&Schwarz,MXO4,1335.5050k04/111986,1.3.2.0\n".to_vec());

    core.write(b"CHAN1:DATA:XINC?\n").unwrap();
    assert_eq!(core.read_stb().unwrap(), 0x10);
    core.clear().unwrap();
    assert_eq!(core.read_stb().unwrap(), 0);

    // Nothing queued: the fake reports an I/O timeout
    assert!(matches!(core.read(), Err(Error::Device(DeviceError::IoTimeout))));

    core.destroy_link().unwrap();
    assert!(core.destroy_link().is_err());
    drop(core);

    let log = scope.join();
    let log = log.lock().unwrap();
    assert!(log.cleared);
    assert!(log.link_destroyed);
    assert_eq!(log.commands, vec!["*IDN?", "CHAN1:DATA:XINC?"]);
}

#[test]
fn unknown_device_name_is_refused() {
    let scope = FakeScope::start();

    let mut core = CoreClient::with_portmapper("127.0.0.1", scope.pmap_port, Duration::from_secs(5)).unwrap();
    assert!(matches!(core.create_link("inst9"), Err(Error::Device(DeviceError::InvalidAddress))));
    assert!(core.link().is_none());
    drop(core);

    scope.join();
}

#[test]
fn empty_partial_read_ends_the_read() {
    let scope = FakeScope::start();

    let mut core = CoreClient::with_portmapper("127.0.0.1", scope.pmap_port, Duration::from_secs(5)).unwrap();
    core.create_link("inst0").unwrap();

    core.write(b"STALL?\n").unwrap();
    assert!(matches!(core.read(), Err(Error::Link(_))));
    core.destroy_link().unwrap();
    drop(core);

    let log = scope.join();
    assert_eq!(log.lock().unwrap().stalled_reads, 1);
}
