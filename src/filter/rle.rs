//! RunLengthDecode (PackBits). Decode only.

use crate::core::Result;
use crate::filter::Sink;

enum RleState {
    AwaitingLength,
    Literal(u8),
    Run(u8),
    Done,
}

pub(crate) struct RleDecoder {
    next: Box<dyn Sink>,
    state: RleState,
}

impl RleDecoder {
    pub fn new(next: Box<dyn Sink>) -> Self {
        RleDecoder {
            next,
            state: RleState::AwaitingLength,
        }
    }
}

impl Sink for RleDecoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(data.len() * 2);
        for &b in data {
            match self.state {
                RleState::Done => break,
                RleState::AwaitingLength => {
                    self.state = match b {
                        128 => RleState::Done,
                        0..=127 => RleState::Literal(b + 1),
                        129..=255 => RleState::Run((257 - u16::from(b)) as u8),
                    };
                }
                RleState::Literal(remaining) => {
                    out.push(b);
                    self.state = if remaining == 1 {
                        RleState::AwaitingLength
                    } else {
                        RleState::Literal(remaining - 1)
                    };
                }
                RleState::Run(count) => {
                    out.extend(std::iter::repeat_n(b, usize::from(count)));
                    self.state = RleState::AwaitingLength;
                }
            }
        }
        self.next.write(&out)
    }

    fn finish(&mut self) -> Result<()> {
        self.next.finish()
    }
}
