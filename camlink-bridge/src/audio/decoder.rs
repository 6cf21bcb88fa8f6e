//! G.711 companded audio decoding
//!
//! Converts 8-bit logarithmically companded samples (ITU-T G.711 A-law or
//! μ-law) into 16-bit linear PCM. Each input byte maps to exactly one output
//! sample through a 256-entry table built at compile time, so decoding is a
//! single indexed load per byte: branch-free, allocation-free (with
//! [`Decoder::decode_into`]) and total over every byte value.
//!
//! The matching encoders are provided for synthetic sources and test
//! fixtures; the bridge itself only decodes.

use serde::{Deserialize, Serialize};

/// Companding law of the incoming byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// G.711 A-law (PCMA), the usual camera intercom format
    #[default]
    #[serde(alias = "pcma", alias = "a-law")]
    Alaw,
    /// G.711 μ-law (PCMU)
    #[serde(alias = "pcmu", alias = "mu-law", alias = "ulaw")]
    Mulaw,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Alaw => "alaw",
            Codec::Mulaw => "mulaw",
        }
    }

    /// Decode table for this law
    pub fn table(&self) -> &'static [i16; 256] {
        match self {
            Codec::Alaw => &ALAW_TO_LINEAR,
            Codec::Mulaw => &MULAW_TO_LINEAR,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "alaw" | "a-law" | "pcma" => Ok(Codec::Alaw),
            "mulaw" | "mu-law" | "ulaw" | "pcmu" => Ok(Codec::Mulaw),
            other => Err(format!("unknown codec '{}' (expected alaw or mulaw)", other)),
        }
    }
}

const SIGN_BIT: u8 = 0x80;
const QUANT_MASK: u8 = 0x0F;
const SEG_MASK: u8 = 0x70;
const SEG_SHIFT: u8 = 4;
const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 8159;

/// Segment end points for A-law encoding (13-bit magnitude domain)
const ALAW_SEG_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

/// Segment end points for μ-law encoding (14-bit magnitude domain)
const MULAW_SEG_END: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];

const fn alaw_to_linear(code: u8) -> i16 {
    let a = code ^ 0x55;
    let mut t = ((a & QUANT_MASK) as i32) << 4;
    let seg = ((a & SEG_MASK) >> SEG_SHIFT) as i32;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }
    if a & SIGN_BIT != 0 {
        t as i16
    } else {
        -t as i16
    }
}

const fn mulaw_to_linear(code: u8) -> i16 {
    let u = !code;
    let mut t = (((u & QUANT_MASK) as i32) << 3) + MULAW_BIAS;
    t <<= ((u & SEG_MASK) >> SEG_SHIFT) as i32;
    if u & SIGN_BIT != 0 {
        (MULAW_BIAS - t) as i16
    } else {
        (t - MULAW_BIAS) as i16
    }
}

const fn build_table(mulaw: bool) -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = if mulaw {
            mulaw_to_linear(i as u8)
        } else {
            alaw_to_linear(i as u8)
        };
        i += 1;
    }
    table
}

/// A-law code → linear PCM
pub static ALAW_TO_LINEAR: [i16; 256] = build_table(false);

/// μ-law code → linear PCM
pub static MULAW_TO_LINEAR: [i16; 256] = build_table(true);

fn segment(value: i32, table: &[i32; 8]) -> usize {
    table.iter().position(|&end| value <= end).unwrap_or(table.len())
}

/// Encode one linear PCM sample as A-law
pub fn encode_alaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 3;
    let mask: u8 = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let seg = segment(pcm, &ALAW_SEG_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }

    let mut aval = (seg as u8) << SEG_SHIFT;
    if seg < 2 {
        aval |= ((pcm >> 1) as u8) & QUANT_MASK;
    } else {
        aval |= ((pcm >> seg) as u8) & QUANT_MASK;
    }
    aval ^ mask
}

/// Encode one linear PCM sample as μ-law
pub fn encode_mulaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 2;
    let mask: u8 = if pcm < 0 {
        pcm = -pcm;
        0x7F
    } else {
        0xFF
    };
    pcm = pcm.min(MULAW_CLIP) + (MULAW_BIAS >> 2);

    let seg = segment(pcm, &MULAW_SEG_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }

    let uval = ((seg as u8) << 4) | (((pcm >> (seg + 1)) as u8) & QUANT_MASK);
    uval ^ mask
}

/// Stateless G.711 decoder
///
/// Copyable and free of shared mutable state; any thread may decode.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    codec: Codec,
    table: &'static [i16; 256],
}

impl Decoder {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            table: codec.table(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Decode a single companded byte
    #[inline]
    pub fn decode_sample(&self, code: u8) -> i16 {
        self.table[code as usize]
    }

    /// Decode `input` into a freshly allocated PCM block.
    ///
    /// `output.len() == input.len()` always holds.
    pub fn decode(&self, input: &[u8]) -> Vec<i16> {
        input.iter().map(|&b| self.table[b as usize]).collect()
    }

    /// Decode into a caller-provided buffer.
    ///
    /// Decodes `min(input.len(), output.len())` bytes and returns that count.
    #[inline]
    pub fn decode_into(&self, input: &[u8], output: &mut [i16]) -> usize {
        let n = input.len().min(output.len());
        for (out, &code) in output[..n].iter_mut().zip(&input[..n]) {
            *out = self.table[code as usize];
        }
        n
    }

    /// Encode linear PCM with this decoder's law (fixture/tone generation)
    pub fn encode(&self, samples: &[i16]) -> Vec<u8> {
        let encode = match self.codec {
            Codec::Alaw => encode_alaw,
            Codec::Mulaw => encode_mulaw,
        };
        samples.iter().map(|&s| encode(s)).collect()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(Codec::Alaw)
    }
}
