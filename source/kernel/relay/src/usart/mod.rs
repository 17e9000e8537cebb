// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-driven USART0 driver built on rendezvous messaging
//! OWNERS: @kernel-drivers-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (register encoding) + simulator scenarios (tests.rs)
//! PUBLIC API: Usart (new/configure/write_byte/write/read_byte/available/read_now + ISR entries), UsartConfig, UsartWriter
//! DEPENDS_ON: sched::Kernel, ipc (send/answer), relay_hal::ByteRegisters
//! INVARIANTS: Writers and readers are served FIFO; UDRIE is set only while a writer may be queued
//!
//! Writers send their byte to the transmit queue and block. The
//! data-register-empty interrupt hands the head writer's byte to the data
//! register and answers it. Readers send to the receive queue; the
//! receive-complete interrupt answers the head reader with the byte.


use core::fmt;

use bitflags::bitflags;
use relay_hal::ByteRegisters;

use crate::arch::Arch;
use crate::sched::Kernel;
use crate::types::{Message, QueueId};

/// USART0 registers (data-space addresses).
pub mod regs {
    pub const UCSR0A: usize = 0xC0;
    pub const UCSR0B: usize = 0xC1;
    pub const UCSR0C: usize = 0xC2;
    /// Low byte of the baud divisor; the high byte follows.
    pub const UBRR0L: usize = 0xC4;
    pub const UDR0: usize = 0xC6;
}

bitflags! {
    /// UCSR0A status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusA: u8 {
        const RXC = 1 << 7;
        const TXC = 1 << 6;
        const UDRE = 1 << 5;
        const FE = 1 << 4;
        const DOR = 1 << 3;
        const UPE = 1 << 2;
        const U2X = 1 << 1;
        const MPCM = 1 << 0;
    }
}

bitflags! {
    /// UCSR0B control bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlB: u8 {
        const RXCIE = 1 << 7;
        const TXCIE = 1 << 6;
        const UDRIE = 1 << 5;
        const RXEN = 1 << 4;
        const TXEN = 1 << 3;
        const UCSZ2 = 1 << 2;
        const RXB8 = 1 << 1;
        const TXB8 = 1 << 0;
    }
}

const UPM0_SHIFT: u8 = 4;
const USBS_SHIFT: u8 = 3;
const UCSZ0_SHIFT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
    Nine,
}

impl DataBits {
    /// UCSZ01:00 field value.
    const fn low_bits(self) -> u8 {
        match self {
            DataBits::Five => 0,
            DataBits::Six => 1,
            DataBits::Seven => 2,
            DataBits::Eight | DataBits::Nine => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    const fn bits(self) -> u8 {
        match self {
            Parity::None => 0b00,
            Parity::Even => 0b10,
            Parity::Odd => 0b11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Line settings. Build with [`UsartConfig::new`] (8N1) and adjust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsartConfig {
    pub cpu_hz: u32,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl UsartConfig {
    pub const fn new(cpu_hz: u32, baud: u32) -> Self {
        Self { cpu_hz, baud, data_bits: DataBits::Eight, parity: Parity::None, stop_bits: StopBits::One }
    }

    pub const fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub const fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub const fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Baud rate divisor for normal-speed mode.
    pub const fn divisor(&self) -> u16 {
        if self.baud == 0 {
            return 0;
        }
        (self.cpu_hz / 16 / self.baud).saturating_sub(1) as u16
    }

    pub fn control_b(&self) -> ControlB {
        let mut bits = ControlB::RXCIE | ControlB::RXEN | ControlB::TXEN;
        if self.data_bits == DataBits::Nine {
            bits |= ControlB::UCSZ2;
        }
        bits
    }

    pub const fn control_c(&self) -> u8 {
        let stop = match self.stop_bits {
            StopBits::One => 0,
            StopBits::Two => 1,
        };
        (self.parity.bits() << UPM0_SHIFT)
            | (stop << USBS_SHIFT)
            | (self.data_bits.low_bits() << UCSZ0_SHIFT)
    }
}

/// USART0 with its transmit and receive queues.
pub struct Usart<R: ByteRegisters, A: Arch, const N: usize> {
    kernel: &'static Kernel<A, N>,
    regs: R,
    tx: QueueId,
    rx: QueueId,
}

impl<R: ByteRegisters, A: Arch, const N: usize> Usart<R, A, N> {
    /// `tx` and `rx` must be distinct queues reserved for this device.
    pub const fn new(kernel: &'static Kernel<A, N>, regs: R, tx: QueueId, rx: QueueId) -> Self {
        Self { kernel, regs, tx, rx }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Programs the line settings and enables the receiver, transmitter
    /// and receive interrupt.
    pub fn configure(&self, config: UsartConfig) {
        let arch = self.kernel.arch();
        let was_enabled = arch.disable_interrupts();
        self.regs.write_u16(regs::UBRR0L, config.divisor());
        self.regs.write(regs::UCSR0A, 0);
        self.regs.write(regs::UCSR0B, config.control_b().bits());
        self.regs.write(regs::UCSR0C, config.control_c());
        arch.restore_interrupts(was_enabled);
        log_debug!(target: "usart", "configured {} baud (divisor {})", config.baud, config.divisor());
    }

    /// Queues `byte` for transmission and blocks until the interrupt
    /// handler has moved it into the data register.
    pub fn write_byte(&self, byte: u8) {
        let arch = self.kernel.arch();
        // Keep interrupts masked until we are queued, or the handler could
        // find no writer and switch itself off.
        let was_enabled = arch.disable_interrupts();
        self.regs.set_bits(regs::UCSR0B, ControlB::UDRIE.bits());
        self.kernel.send(self.tx, Message::from(byte));
        arch.restore_interrupts(was_enabled);
    }

    pub fn write(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Blocks until a byte arrives.
    pub fn read_byte(&self) -> u8 {
        self.kernel.send(self.rx, 0) as u8
    }

    /// True when a received byte waits in the data register.
    pub fn available(&self) -> bool {
        StatusA::from_bits_retain(self.regs.read(regs::UCSR0A)).contains(StatusA::RXC)
    }

    /// Reads the data register without waiting.
    pub fn read_now(&self) -> u8 {
        self.regs.read(regs::UDR0)
    }

    /// USART_UDRE interrupt entry.
    pub fn on_data_register_empty(&self) {
        match self.kernel.list_head_from_isr(self.tx) {
            Some(writer) => {
                let byte = self.kernel.message(writer).unwrap_or(0) as u8;
                self.regs.write(regs::UDR0, byte);
                self.kernel.answer_void(writer);
            }
            None => self.regs.clear_bits(regs::UCSR0B, ControlB::UDRIE.bits()),
        }
    }

    /// USART_RX interrupt entry. The byte is dropped when nobody is reading.
    pub fn on_receive_complete(&self) {
        let byte = self.regs.read(regs::UDR0);
        if let Some(reader) = self.kernel.list_head_from_isr(self.rx) {
            self.kernel.answer(reader, Message::from(byte));
        }
    }

    pub fn writer(&self) -> UsartWriter<'_, R, A, N> {
        UsartWriter { usart: self }
    }
}

/// `core::fmt::Write` adapter over a [`Usart`].
pub struct UsartWriter<'u, R: ByteRegisters, A: Arch, const N: usize> {
    usart: &'u Usart<R, A, N>,
}

impl<R: ByteRegisters, A: Arch, const N: usize> fmt::Write for UsartWriter<'_, R, A, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.usart.write(s.as_bytes());
        Ok(())
    }
}
