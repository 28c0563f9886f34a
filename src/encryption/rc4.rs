//! RC4 stream cipher.
//!
//! Needed for the /O and /U computations on every revision and for
//! object encryption with [`EncryptionAlgorithm::Rc4_128`](super::EncryptionAlgorithm).
//!
//! PDF Spec: Section 7.6.2 - General Encryption Algorithm

struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (index, slot) in state.iter_mut().enumerate() {
            *slot = index as u8;
        }

        let mut j = 0u8;
        for index in 0..256 {
            j = j
                .wrapping_add(state[index])
                .wrapping_add(key[index % key.len()]);
            state.swap(index, j as usize);
        }

        Self { state, i: 0, j: 0 }
    }

    fn keystream_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let index = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[index as usize]
    }
}

/// Encrypt or decrypt `data` with `key`. An empty key returns the input.
pub fn rc4_crypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    let mut cipher = Rc4::new(key);
    data.iter().map(|byte| byte ^ cipher.keystream_byte()).collect()
}
