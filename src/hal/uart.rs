//! Polled USART0 transmitter for reports and demo output

use core::convert::Infallible;

use super::atmega128::Reg8;
use crate::config::CPU_FREQ_HZ;

const UBRR0H: Reg8 = Reg8::at(0x90);
const UBRR0L: Reg8 = Reg8::at(0x29);
const UCSR0A: Reg8 = Reg8::at(0x2b);
const UCSR0B: Reg8 = Reg8::at(0x2a);
const UDR0: Reg8 = Reg8::at(0x2c);

const UDRE0: u8 = 1 << 5;
const TXEN0: u8 = 1 << 3;

/// Baud rate divisor for normal-speed asynchronous mode
const fn ubrr(baud: u32) -> u16 {
    (CPU_FREQ_HZ / (16 * baud) - 1) as u16
}

pub struct Uart {
    _private: (),
}

impl Uart {
    /// Enable the transmitter, 8N1 (the reset frame format)
    pub fn new(baud: u32) -> Self {
        let [low, high] = ubrr(baud).to_le_bytes();
        UBRR0H.write(high);
        UBRR0L.write(low);
        UCSR0B.modify(|r| r | TXEN0);
        Self { _private: () }
    }

    pub fn write_byte(&mut self, byte: u8) {
        while UCSR0A.read() & UDRE0 == 0 {}
        UDR0.write(byte);
    }
}

impl ufmt::uWrite for Uart {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}
