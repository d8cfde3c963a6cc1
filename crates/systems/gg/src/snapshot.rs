//! Machine snapshot codec
//!
//! Layout: the literal `GGSTATE\n`, then the processor, mapper, VDP and PSG
//! states, each bincode-encoded. The ROM itself is never included.
//!
//! Loading is two-phase: every component is decoded and validated into a
//! [`Staged`] snapshot before anything is applied, so a bad file can never
//! leave the machine half-restored.

use crate::bus::Chipset;
use crate::error::SnapshotError;
use crate::mapper::MapperState;
use crate::vdp::Vdp;
use emu_core::apu::Sn76489Psg;
use emu_core::cpu_z80::Processor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

pub const MAGIC: &[u8; 8] = b"GGSTATE\n";

/// Upper bound for one decoded component
const COMPONENT_LIMIT: usize = 1 << 20;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<COMPONENT_LIMIT>()
}

fn encode<T: Serialize, W: Write + ?Sized>(value: &T, out: &mut W) -> Result<(), SnapshotError> {
    let mut out = out;
    bincode::serde::encode_into_std_write(value, &mut out, config())
        .map(|_| ())
        .map_err(|e| SnapshotError::Encode(e.to_string()))
}

fn decode<T: DeserializeOwned, R: Read + ?Sized>(input: &mut R) -> Result<T, SnapshotError> {
    let mut input = input;
    bincode::serde::decode_from_std_read(&mut input, config())
        .map_err(|e| SnapshotError::Decode(e.to_string()))
}

fn invalid(component: &'static str) -> impl FnOnce(String) -> SnapshotError {
    move |reason| SnapshotError::Invalid { component, reason }
}

/// Write a complete snapshot
pub fn write_snapshot<P: Processor, W: Write + ?Sized>(
    out: &mut W,
    cpu: &P,
    chips: &Chipset,
) -> Result<(), SnapshotError> {
    out.write_all(MAGIC)?;
    encode(&cpu.state(), out)?;
    encode(chips.mapper.mapper_state(), out)?;
    encode(&chips.vdp, out)?;
    encode(&chips.psg, out)?;
    out.flush()?;
    Ok(())
}

/// A decoded snapshot that passed every structural check
pub struct Staged<S> {
    pub cpu: S,
    pub mapper: MapperState,
    pub vdp: Vdp,
    pub psg: Sn76489Psg,
}

/// Decode and validate a snapshot against the current machine
pub fn read_snapshot<P: Processor, R: Read + ?Sized>(
    input: &mut R,
    chips: &Chipset,
) -> Result<Staged<P::State>, SnapshotError> {
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let cpu: P::State = decode(input)?;
    let mapper: MapperState = decode(input)?;
    let mut vdp: Vdp = decode(input)?;
    let psg: Sn76489Psg = decode(input)?;

    P::validate_state(&cpu).map_err(invalid("processor"))?;
    chips.mapper.validate(&mapper).map_err(invalid("mapper"))?;
    vdp.set_sprite_limit(chips.vdp.sprite_limit());
    vdp.validate().map_err(invalid("video"))?;
    psg.validate().map_err(invalid("sound"))?;

    Ok(Staged {
        cpu,
        mapper,
        vdp,
        psg,
    })
}

impl<S> Staged<S> {
    /// Install the staged state; cannot fail
    pub fn apply<P: Processor<State = S>>(self, cpu: &mut P, chips: &mut Chipset) {
        cpu.restore_state(self.cpu);
        chips.mapper.restore(self.mapper);
        chips.vdp.restore(self.vdp);
        chips.psg = self.psg;
    }
}
