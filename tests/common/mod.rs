//! Shared telegram fixtures for the integration tests.

#![allow(dead_code)]

use p1_rs::p1::crc16;
use p1_rs::util::hex::format_crc;

/// DSMR 5 telegram body, from `/` through `!`.
pub const DSMR5_BODY: &[u8] = b"/ISK5\\2M550T-1012\r\n\
\r\n\
1-3:0.2.8(50)\r\n\
0-0:1.0.0(200601120016S)\r\n\
0-0:96.1.1(4530303434303037313331363530363137)\r\n\
1-0:1.8.1(001581.123*kWh)\r\n\
1-0:1.8.2(001435.706*kWh)\r\n\
1-0:2.8.1(000000.000*kWh)\r\n\
1-0:2.8.2(000000.000*kWh)\r\n\
0-0:96.14.0(0002)\r\n\
1-0:1.7.0(00.192*kW)\r\n\
1-0:2.7.0(00.000*kW)\r\n\
0-1:24.2.1(200601120000S)(00981.443*m3)\r\n\
!";

/// Legacy DSMR 2.2 telegram without CRC.
pub const DSMR22: &[u8] = b"/KFM5KAIFA-METER\r\n\
\r\n\
0-0:96.1.1(4530303033303030303030303030303030)\r\n\
1-0:1.8.1(000123.456*kWh)\r\n\
1-0:1.7.0(0000.12*kW)\r\n\
!\r\n";

/// Appends the CRC of `body` and CR LF.
pub fn seal(body: &[u8]) -> Vec<u8> {
    let mut telegram = body.to_vec();
    telegram.extend_from_slice(format_crc(crc16(body)).as_bytes());
    telegram.extend_from_slice(b"\r\n");
    telegram
}

pub fn dsmr5() -> Vec<u8> {
    seal(DSMR5_BODY)
}
