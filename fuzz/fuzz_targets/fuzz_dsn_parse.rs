#![no_main]

use libfuzzer_sys::fuzz_target;
use pgconnect::config::ConnectionInfo;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(info) = ConnectionInfo::parse(s) {
        // Parsed results must be usable downstream without panicking
        let _ = info.endpoint();
        let _ = info.to_tls_config();
        let _ = format!("{:?}", info);
        assert_ne!(info.port, 0);
    }
});
