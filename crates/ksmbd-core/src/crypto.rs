//! MD4 and the NT hash derived from it.
//!
//! Password verification compares the stored NT hash (MD4 of the UTF-16LE
//! password) against material supplied by the login handshake. Translated
//! from the reference streaming updater rather than pulled in as a crate,
//! since MD4 appears nowhere else in this daemon's dependency surface and
//! pulling in a whole digest-crate family for one obsolete algorithm isn't
//! worth it.

const BLOCK_SIZE: usize = 64;

fn f(x: u32, y: u32, z: u32) -> u32 {
    (x & y) | (!x & z)
}

fn g(x: u32, y: u32, z: u32) -> u32 {
    (x & y) | (x & z) | (y & z)
}

fn h(x: u32, y: u32, z: u32) -> u32 {
    x ^ y ^ z
}

/// Streaming MD4 state, fed via [`Md4::update`] and finalized via [`Md4::finish`].
pub struct Md4 {
    state: [u32; 4],
    block: [u8; BLOCK_SIZE],
    byte_count: u64,
}

impl Default for Md4 {
    fn default() -> Self {
        Md4::new()
    }
}

impl Md4 {
    pub fn new() -> Self {
        Md4 {
            state: [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476],
            block: [0; BLOCK_SIZE],
            byte_count: 0,
        }
    }

    /// Feeds `data` into the running hash. Mirrors the reference streaming
    /// updater's explicit split on whether the current block has enough
    /// slack (`avail`) to hold all of `data` (`avail > len`) or must be
    /// completed and transformed first (`avail <= len`).
    pub fn update(&mut self, mut data: &[u8]) {
        let avail = BLOCK_SIZE - (self.byte_count as usize & 0x3f);
        self.byte_count += data.len() as u64;

        if avail > data.len() {
            let offset = BLOCK_SIZE - avail;
            self.block[offset..offset + data.len()].copy_from_slice(data);
            return;
        }

        let offset = BLOCK_SIZE - avail;
        self.block[offset..offset + avail].copy_from_slice(&data[..avail]);
        self.transform();
        data = &data[avail..];

        while data.len() >= BLOCK_SIZE {
            self.block.copy_from_slice(&data[..BLOCK_SIZE]);
            self.transform();
            data = &data[BLOCK_SIZE..];
        }

        self.block[..data.len()].copy_from_slice(data);
    }

    pub fn finish(mut self) -> [u8; 16] {
        let bit_count = self.byte_count * 8;
        let pad_offset = (self.byte_count as usize) & 0x3f;
        let mut pad = [0u8; BLOCK_SIZE + 8];
        pad[0] = 0x80;
        let pad_len = if pad_offset < 56 {
            56 - pad_offset
        } else {
            120 - pad_offset
        };
        self.update(&pad[..pad_len]);
        self.update(&bit_count.to_le_bytes());
        let mut out = [0u8; 16];
        for (i, word) in self.state.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    fn transform(&mut self) {
        let mut x = [0u32; 16];
        for (i, chunk) in self.block.chunks_exact(4).enumerate() {
            x[i] = u32::from_le_bytes(chunk.try_into().unwrap());
        }

        let [mut a, mut b, mut c, mut d] = self.state;

        macro_rules! round1 {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a
                    .wrapping_add(f($b, $c, $d))
                    .wrapping_add(x[$k]))
                .rotate_left($s)
            };
        }
        macro_rules! round2 {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a
                    .wrapping_add(g($b, $c, $d))
                    .wrapping_add(x[$k])
                    .wrapping_add(0x5a82_7999))
                .rotate_left($s)
            };
        }
        macro_rules! round3 {
            ($a:expr, $b:expr, $c:expr, $d:expr, $k:expr, $s:expr) => {
                $a = ($a
                    .wrapping_add(h($b, $c, $d))
                    .wrapping_add(x[$k])
                    .wrapping_add(0x6ed9_eba1))
                .rotate_left($s)
            };
        }

        for (pos, &k) in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
            .iter()
            .enumerate()
        {
            let s = [3, 7, 11, 19][pos % 4];
            match pos % 4 {
                0 => round1!(a, b, c, d, k, s),
                1 => round1!(d, a, b, c, k, s),
                2 => round1!(c, d, a, b, k, s),
                _ => round1!(b, c, d, a, k, s),
            }
        }

        for (pos, &k) in [0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15]
            .iter()
            .enumerate()
        {
            let s = [3, 5, 9, 13][pos % 4];
            match pos % 4 {
                0 => round2!(a, b, c, d, k, s),
                1 => round2!(d, a, b, c, k, s),
                2 => round2!(c, d, a, b, k, s),
                _ => round2!(b, c, d, a, k, s),
            }
        }

        for (pos, &k) in [0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15]
            .iter()
            .enumerate()
        {
            let s = [3, 9, 11, 15][pos % 4];
            match pos % 4 {
                0 => round3!(a, b, c, d, k, s),
                1 => round3!(d, a, b, c, k, s),
                2 => round3!(c, d, a, b, k, s),
                _ => round3!(b, c, d, a, k, s),
            }
        }

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
    }
}

/// Computes the NT hash (MD4 over the UTF-16LE password) used by
/// `smb.conf`-style password databases.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let utf16: Vec<u8> = password
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    let mut md4 = Md4::new();
    md4.update(&utf16);
    md4.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md4_of_empty_string_matches_known_vector() {
        let md4 = Md4::new();
        let digest = md4.finish();
        assert_eq!(
            hex(&digest),
            "31d6cfe0d16ae931b73c59d7e0c089c0"
        );
    }

    #[test]
    fn md4_of_abc_matches_known_vector() {
        let mut md4 = Md4::new();
        md4.update(b"abc");
        let digest = md4.finish();
        assert_eq!(
            hex(&digest),
            "a448017aaf21d8525fc10ae87aa6729d"
        );
    }

    #[test]
    fn update_handles_data_spanning_multiple_blocks() {
        let data = vec![0x41u8; 200]; // > one block, exercises the avail<=len path twice
        let mut md4 = Md4::new();
        md4.update(&data[..10]);
        md4.update(&data[10..]);
        let chunked = md4.finish();

        let mut md4_whole = Md4::new();
        md4_whole.update(&data);
        let whole = md4_whole.finish();

        assert_eq!(chunked, whole);
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
