//! Checkpoint codec.
//!
//! One line per agent, space separated, fields in this order:
//!
//! ```text
//! index x y z diameter can_divide oxygen_level hypoxia_division cancerous_origin
//! ```
//!
//! Numbers use default `Display` formatting and flags are written as `1`/`0`.
//! One file per subdomain; its presence means "resume" rather than "construct".

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use tissue_common::{Phenotype, Vec3};

use crate::agent::Agent;
use crate::error::{TissueError, TissueResult};

pub const FIELDS_PER_LINE: usize = 9;

/// Deterministic checkpoint location for a subdomain id.
pub fn checkpoint_path(dir: &Path, subdomain_id: usize) -> PathBuf {
    dir.join(format!("subdomain_{}.ckpt", subdomain_id))
}

/// One decoded checkpoint line.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub index: usize,
    pub position: Vec3,
    pub diameter: f64,
    pub can_divide: bool,
    pub oxygen_level: f64,
    pub hypoxia_division: bool,
    pub cancerous_origin: bool,
}

impl CheckpointRecord {
    pub fn from_agent(index: usize, agent: &Agent) -> Self {
        CheckpointRecord {
            index,
            position: agent.position,
            diameter: agent.diameter,
            can_divide: agent.can_divide,
            oxygen_level: agent.oxygen_level,
            hypoxia_division: agent.hypoxia_division,
            cancerous_origin: agent.cancerous_origin,
        }
    }

    /// Phenotype of the restored agent. The line has no phenotype column:
    /// only cancerous cells ever carry either division flag.
    pub fn phenotype(&self) -> Phenotype {
        if self.can_divide || self.cancerous_origin {
            Phenotype::Cancerous
        } else {
            Phenotype::Host
        }
    }

    /// Restore closure: rebuilds the agent this record was written from.
    pub fn into_agent(self) -> Agent {
        let mut agent = Agent::new(self.position, self.phenotype(), self.diameter);
        agent.can_divide = self.can_divide;
        agent.oxygen_level = self.oxygen_level;
        agent.hypoxia_division = self.hypoxia_division;
        agent.cancerous_origin = self.cancerous_origin;
        agent
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

pub fn encode_line(index: usize, agent: &Agent) -> String {
    let record = CheckpointRecord::from_agent(index, agent);
    format!(
        "{} {} {} {} {} {} {} {} {}",
        record.index,
        record.position.x,
        record.position.y,
        record.position.z,
        record.diameter,
        flag(record.can_divide),
        record.oxygen_level,
        flag(record.hypoxia_division),
        flag(record.cancerous_origin),
    )
}

/// Decodes one line. Errors carry the reason only; the caller adds location.
pub fn decode_line(line: &str) -> Result<CheckpointRecord, String> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() != FIELDS_PER_LINE {
        return Err(format!("expected {} fields, found {}", FIELDS_PER_LINE, fields.len()));
    }
    let number = |i: usize, name: &str| -> Result<f64, String> {
        fields[i]
            .parse::<f64>()
            .map_err(|_| format!("{} is not a number: {:?}", name, fields[i]))
    };
    let boolean = |i: usize, name: &str| -> Result<bool, String> {
        match fields[i] {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(format!("{} is not a 0/1 flag: {:?}", name, other)),
        }
    };
    let index = fields[0]
        .parse::<usize>()
        .map_err(|_| format!("index is not a non-negative integer: {:?}", fields[0]))?;

    Ok(CheckpointRecord {
        index,
        position: Vec3::new(number(1, "x")?, number(2, "y")?, number(3, "z")?),
        diameter: number(4, "diameter")?,
        can_divide: boolean(5, "can_divide")?,
        oxygen_level: number(6, "oxygen_level")?,
        hypoxia_division: boolean(7, "hypoxia_division")?,
        cancerous_origin: boolean(8, "cancerous_origin")?,
    })
}

pub fn write_agents<W: Write>(writer: &mut W, agents: &[Agent]) -> std::io::Result<()> {
    for (index, agent) in agents.iter().enumerate() {
        writeln!(writer, "{}", encode_line(index, agent))?;
    }
    Ok(())
}

/// Decodes every line of `reader`; `path` is only used for error reports.
pub fn read_records<R: BufRead>(reader: R, path: &Path) -> TissueResult<Vec<CheckpointRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TissueError::CheckpointIo { path: path.to_path_buf(), source })?;
        let record = decode_line(&line).map_err(|reason| TissueError::MalformedCheckpoint {
            path: path.to_path_buf(),
            line_number: i + 1,
            line: line.clone(),
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Writes the population of one subdomain, replacing any earlier checkpoint.
pub fn save(path: &Path, agents: &[Agent]) -> TissueResult<()> {
    let io_err = |source: std::io::Error| TissueError::CheckpointIo { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write_agents(&mut writer, agents).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    info!("Checkpoint with {} agents written to {}", agents.len(), path.display());
    Ok(())
}

/// Reads a checkpoint back into agents.
pub fn load(path: &Path) -> TissueResult<Vec<Agent>> {
    let file = File::open(path).map_err(|source| TissueError::CheckpointIo { path: path.to_path_buf(), source })?;
    let records = read_records(BufReader::new(file), path)?;
    Ok(records.into_iter().map(CheckpointRecord::into_agent).collect())
}

/// Loads the subdomain's checkpoint if one exists.
pub fn try_resume(dir: &Path, subdomain_id: usize) -> TissueResult<Option<Vec<Agent>>> {
    let path = checkpoint_path(dir, subdomain_id);
    if !path.exists() {
        return Ok(None);
    }
    load(&path).map(Some)
}

/// Deletes the subdomain's checkpoint if one exists.
pub fn remove(dir: &Path, subdomain_id: usize) -> TissueResult<bool> {
    let path = checkpoint_path(dir, subdomain_id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(TissueError::CheckpointIo { path, source }),
    }
}
