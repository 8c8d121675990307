//! RC4 stream cipher with a keyed S-box cache.

/// RC4 state after key scheduling.
#[derive(Clone)]
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        Rc4 {
            s: schedule(key),
            i: 0,
            j: 0,
        }
    }

    fn from_sbox(s: [u8; 256]) -> Self {
        Rc4 { s, i: 0, j: 0 }
    }

    /// Encrypt or decrypt (the cipher is its own inverse).
    pub fn apply(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply_in_place(&mut out);
        out
    }

    pub fn apply_in_place(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[usize::from(self.i)]);
            self.s.swap(usize::from(self.i), usize::from(self.j));
            let k = self.s[usize::from(
                self.s[usize::from(self.i)].wrapping_add(self.s[usize::from(self.j)]),
            )];
            *b ^= k;
        }
    }
}

fn schedule(key: &[u8]) -> [u8; 256] {
    let mut s = [0u8; 256];
    for (i, v) in s.iter_mut().enumerate() {
        *v = i as u8;
    }
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j
            .wrapping_add(s[i])
            .wrapping_add(key[i % key.len()]);
        s.swap(i, usize::from(j));
    }
    s
}

/// Cache of the last key schedule. Object keys repeat heavily while
/// encrypting a document, and the schedule dominates RC4 cost for short
/// inputs. The full key is compared, not a prefix.
#[derive(Default)]
pub struct SboxCache {
    key: Vec<u8>,
    sbox: Option<[u8; 256]>,
}

impl SboxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyed(&mut self, key: &[u8]) -> Rc4 {
        match &self.sbox {
            Some(sbox) if self.key == key => Rc4::from_sbox(*sbox),
            _ => {
                let sbox = schedule(key);
                self.key = key.to_vec();
                self.sbox = Some(sbox);
                Rc4::from_sbox(sbox)
            }
        }
    }
}

/// One-shot helper used by the key derivation steps.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Rc4::new(key).apply(data)
}
