use defmt::{info, warn};
use fugit::RateExtU32;
use labstation_core::drivers::SerialPort;
use rtic_sync::{channel, make_channel};
use stm32g4xx_hal::gpio::{gpioa, Alternate};
use stm32g4xx_hal::hal::serial::{Read, Write};
use stm32g4xx_hal::rcc::Rcc;
use stm32g4xx_hal::serial::{Error, Event, FullConfig, NoDMA, Rx, SerialExt, Tx};
use stm32g4xx_hal::stm32;

// Module to support the serial command console on rtic
//
// RX side drains the UART in its interrupt into an RTIC channel, so nothing
// is lost while the foreground is busy in a measurement. TX side blocks on
// the transmit register, which is what the foreground wants anyway.

// Holds a few command lines worth of bytes
const RX_CAPACITY: usize = 128;

pub type ConsoleTxPin = gpioa::PA2<Alternate<7>>;
pub type ConsoleRxPin = gpioa::PA3<Alternate<7>>;

type RxSender = channel::Sender<'static, u8, RX_CAPACITY>;
type RxReceiver = channel::Receiver<'static, u8, RX_CAPACITY>;

/// 8N1 at `baud`, receive interrupt enabled
pub fn init(
    usart: stm32::USART2,
    tx: ConsoleTxPin,
    rx: ConsoleRxPin,
    baud: u32,
    rcc: &mut Rcc,
) -> (Console, ConsoleRx) {
    let mut serial = usart
        .usart(tx, rx, FullConfig::default().baudrate(baud.bps()), rcc)
        .unwrap();
    serial.listen(Event::Rxne);
    info!("USART2 at {} baud", baud);

    let (tx, rx) = serial.split();
    let (sender, receiver) = make_channel!(u8, RX_CAPACITY);
    (
        Console { tx, rx: receiver },
        ConsoleRx {
            rx,
            rx_sender: sender,
        },
    )
}

/// Interrupt half
pub struct ConsoleRx {
    rx: Rx<stm32::USART2, ConsoleRxPin, NoDMA>,
    rx_sender: RxSender,
}

impl ConsoleRx {
    pub fn on_irq(&mut self) {
        loop {
            match self.rx.read() {
                Ok(byte) => {
                    if self.rx_sender.try_send(byte).is_err() {
                        // Foreground is behind, the line will be garbled
                        warn!("Console RX queue full");
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(Error::Overrun)) => warn!("Console RX overrun"),
                Err(nb::Error::Other(_)) => warn!("Console RX error"),
            }
        }
    }
}

/// Foreground half
pub struct Console {
    tx: Tx<stm32::USART2, ConsoleTxPin, NoDMA>,
    rx: RxReceiver,
}

impl SerialPort for Console {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }

    fn write_all(&mut self, bytes: &[u8]) {
        for &b in bytes {
            // USART writes are infallible once configured
            nb::block!(self.tx.write(b)).ok();
        }
    }
}
