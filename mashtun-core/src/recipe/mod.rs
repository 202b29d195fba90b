//! Persistent recipe store
//!
//! Stages are packed back to back after the configuration header and
//! terminated by [`RECIPE_END`]. Every edit goes through one primitive,
//! [`RecipeStore::rewrite`], which replaces a byte span with a new encoding
//! and shifts the tail of the recipe so the section stays contiguous.
//!
//! Edits that would grow the recipe past the region capacity fail with
//! [`Error::Full`] before any byte is touched.

pub mod layout;
pub mod region;

pub use layout::{
    ControlProcess, Stage, EXTRA_PROCESSES, MAX_PROCESSES_PER_STAGE, NO_EXTRA_PROCESSES,
    RECIPE_END, STAGE_START,
};
pub use region::{Region, ERASED};

use layout::{encode_marker, encode_process, encode_stage_header, parse_process, parse_stage, StageSpan};

use crate::config::{ConfigHeader, CONFIG_END, RECIPE_START};
use crate::error::Error;
use crate::traits::Eeprom;

/// Sequential walk over the stage records
struct Stages<'a> {
    bytes: &'a [u8],
    addr: usize,
    position: usize,
    done: bool,
}

impl<'a> Stages<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            addr: RECIPE_START,
            position: 0,
            done: false,
        }
    }
}

impl Iterator for Stages<'_> {
    type Item = Result<(Stage, StageSpan), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.bytes.get(self.addr) {
            Some(&RECIPE_END) => {
                self.done = true;
                None
            }
            Some(_) => match parse_stage(self.bytes, self.addr, self.position) {
                Ok((stage, span)) => {
                    self.addr = span.end;
                    self.position += 1;
                    Some(Ok((stage, span)))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(e.into()))
                }
            },
            None => {
                self.done = true;
                Some(Err(Error::CorruptStore))
            }
        }
    }
}

/// Recipe stored in a persistent region
#[derive(Debug, Clone)]
pub struct RecipeStore {
    region: Region,
    /// Address of the recipe terminator
    end_addr: usize,
    /// Whether the image decoded when it was opened
    intact: bool,
}

impl RecipeStore {
    /// Open a store over a loaded region
    ///
    /// A region whose recipe does not decode is kept as-is; every operation
    /// except [`RecipeStore::clear`] then reports [`Error::CorruptStore`].
    pub fn open(region: Region) -> Self {
        let mut store = Self {
            region,
            end_addr: RECIPE_START,
            intact: false,
        };

        if let Ok(end) = store.scan() {
            store.end_addr = end;
            store.intact = true;
        }

        store
    }

    /// Create a freshly formatted store of `capacity` bytes
    pub fn formatted(capacity: usize, header: &ConfigHeader) -> Result<Self, Error> {
        let mut store = Self::open(Region::erased(capacity)?);
        store.clear(header)?;
        Ok(store)
    }

    /// Format the whole region
    ///
    /// Rewrites the header, truncates the recipe to its terminator and
    /// erases every free byte.
    pub fn clear(&mut self, header: &ConfigHeader) -> Result<(), Error> {
        let capacity = self.region.capacity();
        self.region.fill(0..capacity, ERASED)?;
        self.write_header(header)?;
        self.region.write(RECIPE_START, &[RECIPE_END])?;
        self.end_addr = RECIPE_START;
        self.intact = true;
        Ok(())
    }

    /// Persisted configuration header, if it matches the current format
    pub fn header(&self) -> Option<ConfigHeader> {
        ConfigHeader::read_from(&self.region.as_bytes()[..=CONFIG_END])
    }

    /// Replace the persisted configuration header
    pub fn set_header(&mut self, header: &ConfigHeader) -> Result<(), Error> {
        if self.header().as_ref() == Some(header) {
            return Ok(());
        }
        self.write_header(header)
    }

    fn write_header(&mut self, header: &ConfigHeader) -> Result<(), Error> {
        let mut bytes = [ERASED; CONFIG_END + 1];
        header.write_to(&mut bytes)?;
        self.region.write(0, &bytes)
    }

    /// Write pending changes to the storage device
    pub fn flush<E: Eeprom>(&mut self, eeprom: &mut E) -> Result<usize, Error> {
        self.region.flush(eeprom)
    }

    /// Underlying region image
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Raw region content
    pub fn as_bytes(&self) -> &[u8] {
        self.region.as_bytes()
    }

    /// Address of the recipe terminator
    pub fn end_address(&self) -> usize {
        self.end_addr
    }

    /// Free bytes after the recipe terminator
    pub fn memory_remaining(&self) -> usize {
        self.region.capacity().saturating_sub(self.end_addr + 1)
    }

    /// Walk the whole recipe and check it against the cached end address
    pub fn validate(&self) -> Result<(), Error> {
        self.check_intact()?;
        if self.scan()? != self.end_addr {
            return Err(Error::CorruptStore);
        }
        Ok(())
    }

    fn check_intact(&self) -> Result<(), Error> {
        if self.intact {
            Ok(())
        } else {
            Err(Error::CorruptStore)
        }
    }

    /// Walk the recipe and return the terminator address
    fn scan(&self) -> Result<usize, Error> {
        let mut end = RECIPE_START;
        for entry in Stages::new(self.region.as_bytes()) {
            let (_, span) = entry?;
            end = span.end;
        }

        if self.region.get(end) != Some(RECIPE_END) {
            return Err(Error::CorruptStore);
        }
        Ok(end)
    }

    fn stages(&self) -> Result<Stages<'_>, Error> {
        self.check_intact()?;
        Ok(Stages::new(self.region.as_bytes()))
    }

    /// Locate a stage record, `None` if `pos` is past the last stage
    fn span(&self, pos: usize) -> Result<Option<(Stage, StageSpan)>, Error> {
        self.stages()?.nth(pos).transpose()
    }

    // ----- Reads -----

    /// Number of stages
    pub fn stage_count(&self) -> Result<usize, Error> {
        let mut count = 0;
        for entry in self.stages()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Check if the recipe has no stages
    pub fn is_empty(&self) -> bool {
        self.intact && self.end_addr == RECIPE_START
    }

    /// Read a stage
    pub fn stage(&self, pos: usize) -> Result<Stage, Error> {
        self.span(pos)?.map(|(stage, _)| stage).ok_or(Error::NotFound)
    }

    /// Duration of a stage in time units
    pub fn stage_duration(&self, pos: usize) -> Result<f32, Error> {
        Ok(self.stage(pos)?.duration)
    }

    /// Target of a stage
    pub fn stage_target(&self, pos: usize) -> Result<f32, Error> {
        Ok(self.stage(pos)?.target)
    }

    /// Tolerance of a stage
    pub fn stage_tolerance(&self, pos: usize) -> Result<f32, Error> {
        Ok(self.stage(pos)?.tolerance)
    }

    /// Number of extra processes of a stage
    pub fn process_count(&self, pos: usize) -> Result<u8, Error> {
        Ok(self.stage(pos)?.process_count)
    }

    /// Read the `index`-th extra process of a stage
    pub fn control_process(&self, pos: usize, index: usize) -> Result<ControlProcess, Error> {
        let (_, span) = self.span(pos)?.ok_or(Error::NotFound)?;
        if index >= span.process_count as usize {
            return Err(Error::NotFound);
        }

        let bytes = self.region.as_bytes();
        let mut addr = span.processes;
        for _ in 0..index {
            let (_, len) = parse_process(bytes, addr)?;
            addr += len;
        }
        Ok(parse_process(bytes, addr)?.0)
    }

    /// Address of the first byte of a stage
    pub fn stage_address(&self, pos: usize) -> Result<usize, Error> {
        self.span(pos)?
            .map(|(_, span)| span.start)
            .ok_or(Error::NotFound)
    }

    /// Position of the stage whose record contains `addr`
    pub fn stage_at_address(&self, addr: usize) -> Result<usize, Error> {
        for entry in self.stages()? {
            let (stage, span) = entry?;
            if span.contains(addr) {
                return Ok(stage.position);
            }
        }
        Err(Error::NotFound)
    }

    // ----- Edits -----

    /// Replace `old_len` bytes at `addr` with `new`, shifting the tail
    fn rewrite(&mut self, addr: usize, old_len: usize, new: &[u8]) -> Result<(), Error> {
        let tail = addr + old_len..self.end_addr + 1;

        if new.len() > old_len {
            let growth = new.len() - old_len;
            if growth > self.memory_remaining() {
                return Err(Error::Full);
            }
            self.region.shift(tail, growth as isize)?;
            self.end_addr += growth;
        } else if new.len() < old_len {
            let shrink = old_len - new.len();
            self.region.shift(tail, -(shrink as isize))?;
            let old_end = self.end_addr;
            self.end_addr -= shrink;
            self.region.fill(self.end_addr + 1..old_end + 1, ERASED)?;
        }

        self.region.write(addr, new)
    }

    /// Overwrite a stage's scalar fields, or append a stage at the end
    ///
    /// Appending requires `pos` to equal the stage count. An existing stage
    /// keeps its process list.
    pub fn set_stage(
        &mut self,
        pos: usize,
        duration: f32,
        target: f32,
        tolerance: f32,
    ) -> Result<(), Error> {
        self.check_intact()?;
        let header = encode_stage_header(duration, target, tolerance)?;

        if let Some((_, span)) = self.span(pos)? {
            return self.rewrite(span.start, span.marker - span.start, &header);
        }

        if pos != self.stage_count()? {
            return Err(Error::InvalidArgument);
        }

        let mut record = header;
        record
            .extend_from_slice(&encode_marker(0))
            .map_err(|_| Error::InvalidArgument)?;
        self.rewrite(self.end_addr, 0, &record)
    }

    /// Append an extra process to a stage
    pub fn add_process(&mut self, pos: usize, process: ControlProcess) -> Result<(), Error> {
        self.check_intact()?;
        let encoded = encode_process(&process)?;
        let (_, span) = self.span(pos)?.ok_or(Error::InvalidArgument)?;
        if span.process_count >= MAX_PROCESSES_PER_STAGE {
            return Err(Error::Full);
        }

        let old_marker_len = span.processes - span.marker;
        let marker = encode_marker(span.process_count + 1);
        let growth = encoded.len() + marker.len() - old_marker_len;
        if growth > self.memory_remaining() {
            return Err(Error::Full);
        }

        // Process first: the marker sits before it and keeps its address
        self.rewrite(span.end, 0, &encoded)?;
        self.rewrite(span.marker, old_marker_len, &marker)
    }

    /// Remove the first extra process of a stage matching all four fields
    pub fn remove_process(&mut self, pos: usize, process: ControlProcess) -> Result<(), Error> {
        let (_, span) = self.span(pos)?.ok_or(Error::InvalidArgument)?;

        let mut addr = span.processes;
        for _ in 0..span.process_count {
            let (found, len) = parse_process(self.region.as_bytes(), addr)?;
            if found == process {
                self.rewrite(addr, len, &[])?;
                let marker = encode_marker(span.process_count - 1);
                return self.rewrite(span.marker, span.processes - span.marker, &marker);
            }
            addr += len;
        }

        Err(Error::NotFound)
    }

    /// Delete a stage and its processes
    pub fn remove_stage(&mut self, pos: usize) -> Result<(), Error> {
        let (_, span) = self.span(pos)?.ok_or(Error::InvalidArgument)?;
        self.rewrite(span.start, span.len(), &[])
    }

    /// Delete every stage
    pub fn remove_all_stages(&mut self) -> Result<(), Error> {
        self.check_intact()?;
        self.rewrite(RECIPE_START, self.end_addr - RECIPE_START, &[])
    }

    /// Reset a stage's scalar fields to zero, optionally dropping its processes
    pub fn reset_stage(&mut self, pos: usize, reset_processes: bool) -> Result<(), Error> {
        let (_, span) = self.span(pos)?.ok_or(Error::InvalidArgument)?;

        if reset_processes && span.process_count > 0 {
            self.rewrite(span.marker, span.end - span.marker, &encode_marker(0))?;
        }

        let header = encode_stage_header(0.0, 0.0, 0.0)?;
        self.rewrite(span.start, span.marker - span.start, &header)
    }

    /// Reset every stage
    pub fn reset_all_stages(&mut self, reset_processes: bool) -> Result<(), Error> {
        for pos in 0..self.stage_count()? {
            self.reset_stage(pos, reset_processes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_REGION_SIZE;
    use crate::traits::MemEeprom;

    fn store(capacity: usize) -> RecipeStore {
        RecipeStore::formatted(capacity, &ConfigHeader::new(26, 6)).unwrap()
    }

    fn recipe(store: &RecipeStore) -> &[u8] {
        &store.as_bytes()[RECIPE_START..=store.end_address()]
    }

    #[test]
    fn test_formatted_store_is_empty() {
        let store = store(64);
        assert!(store.is_empty());
        assert_eq!(store.stage_count(), Ok(0));
        assert_eq!(recipe(&store), &[RECIPE_END]);
        assert_eq!(store.memory_remaining(), 64 - RECIPE_START - 1);
        assert_eq!(store.header(), Some(ConfigHeader::new(26, 6)));
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_append_stages_densely() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.set_stage(1, 20.0, 72.0, 2.0).unwrap();
        assert_eq!(
            recipe(&store),
            &[252, 10, 65, 1, 254, 252, 20, 72, 2, 254, 255]
        );
        assert_eq!(store.stage_count(), Ok(2));

        // Sparse creation is rejected
        assert_eq!(store.set_stage(3, 1.0, 1.0, 1.0), Err(Error::InvalidArgument));
        assert_eq!(store.stage_count(), Ok(2));
    }

    #[test]
    fn test_set_stage_resizes_in_place() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.set_stage(1, 20.0, 72.0, 2.0).unwrap();

        store.set_stage(0, 10.0, 300.0, 1.0).unwrap();
        assert_eq!(
            recipe(&store),
            &[252, 10, 251, 1, 50, 251, 1, 254, 252, 20, 72, 2, 254, 255]
        );
        assert_eq!(store.stage_target(0), Ok(300.0));
        assert_eq!(store.stage_target(1), Ok(72.0));

        // Shrinking back erases the freed bytes
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        assert_eq!(
            recipe(&store),
            &[252, 10, 65, 1, 254, 252, 20, 72, 2, 254, 255]
        );
        let free = &store.as_bytes()[store.end_address() + 1..];
        assert!(free.iter().all(|&b| b == ERASED));
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_set_stage_keeps_processes() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();
        store.set_stage(0, 15.0, 66.0, 1.0).unwrap();

        assert_eq!(store.process_count(0), Ok(1));
        assert_eq!(
            store.control_process(0, 0),
            Ok(ControlProcess::new(5, 6, 70.0, 2.0))
        );
    }

    #[test]
    fn test_set_stage_grows_header_ahead_of_processes() {
        let mut store = store(64);
        let process = ControlProcess::new(5, 6, 70.0, 2.0);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, process).unwrap();
        store.set_stage(1, 20.0, 70.0, 1.0).unwrap();

        store.set_stage(0, 10.0, 300.0, 1.0).unwrap();
        assert_eq!(
            recipe(&store),
            &[252, 10, 251, 1, 50, 251, 1, 253, 1, 5, 70, 2, 6, 252, 20, 70, 1, 254, 255]
        );
        assert_eq!(store.stage_target(0), Ok(300.0));
        assert_eq!(store.process_count(0), Ok(1));
        assert_eq!(store.control_process(0, 0), Ok(process));
        assert_eq!(store.stage_target(1), Ok(70.0));
        assert_eq!(store.process_count(1), Ok(0));
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_add_and_remove_process() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.set_stage(1, 20.0, 72.0, 2.0).unwrap();
        let before: heapless::Vec<u8, 64> = heapless::Vec::from_slice(store.as_bytes()).unwrap();

        let first = ControlProcess::new(5, 6, 70.0, 2.0);
        let second = ControlProcess::new(7, 8, 40.0, 1.0);
        store.add_process(0, first).unwrap();
        store.add_process(0, second).unwrap();
        assert_eq!(
            recipe(&store),
            &[252, 10, 65, 1, 253, 2, 5, 70, 2, 6, 7, 40, 1, 8, 252, 20, 72, 2, 254, 255]
        );
        assert_eq!(store.control_process(0, 1), Ok(second));
        assert_eq!(store.control_process(0, 2), Err(Error::NotFound));
        assert_eq!(store.stage_target(1), Ok(72.0));

        store.remove_process(0, first).unwrap();
        assert_eq!(store.control_process(0, 0), Ok(second));
        store.remove_process(0, second).unwrap();
        assert_eq!(store.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_remove_process_requires_exact_match() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();

        assert_eq!(
            store.remove_process(0, ControlProcess::new(5, 6, 70.0, 3.0)),
            Err(Error::NotFound)
        );
        assert_eq!(store.process_count(0), Ok(1));
    }

    #[test]
    fn test_add_process_full_leaves_store_unchanged() {
        let mut store = store(MIN_REGION_SIZE);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        assert_eq!(store.memory_remaining(), 2);

        let before: heapless::Vec<u8, 64> = heapless::Vec::from_slice(store.as_bytes()).unwrap();
        assert_eq!(
            store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)),
            Err(Error::Full)
        );
        assert_eq!(store.as_bytes(), before.as_slice());
        assert_eq!(store.end_address(), RECIPE_START + 5);
    }

    #[test]
    fn test_set_stage_full_when_out_of_memory() {
        let mut store = store(MIN_REGION_SIZE);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        assert_eq!(store.set_stage(1, 10.0, 65.0, 1.0), Err(Error::Full));
        assert_eq!(store.set_stage(0, 10.0, 600.0, 1.0), Err(Error::Full));
        assert_eq!(store.stage_count(), Ok(1));
    }

    #[test]
    fn test_remove_stage_shifts_tail() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();
        store.set_stage(1, 20.0, 72.0, 2.0).unwrap();

        store.remove_stage(0).unwrap();
        assert_eq!(recipe(&store), &[252, 20, 72, 2, 254, 255]);
        assert_eq!(store.stage(0).unwrap().position, 0);
        assert_eq!(store.remove_stage(1), Err(Error::InvalidArgument));

        store.remove_all_stages().unwrap();
        assert!(store.is_empty());
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_reset_stages() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();
        store.set_stage(1, 20.0, 300.0, 2.0).unwrap();

        store.reset_stage(0, false).unwrap();
        assert_eq!(store.stage_duration(0), Ok(0.0));
        assert_eq!(store.process_count(0), Ok(1));

        store.reset_all_stages(true).unwrap();
        assert_eq!(recipe(&store), &[252, 0, 0, 0, 254, 252, 0, 0, 0, 254, 255]);
    }

    #[test]
    fn test_reads_of_missing_stage() {
        let store = store(64);
        assert_eq!(store.stage(0), Err(Error::NotFound));
        assert_eq!(store.stage_duration(2), Err(Error::NotFound));
        assert_eq!(store.control_process(0, 0), Err(Error::NotFound));
        assert_eq!(store.stage_address(0), Err(Error::NotFound));
    }

    #[test]
    fn test_stage_address_lookups_are_inverse() {
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();
        store.set_stage(1, 20.0, 72.0, 2.0).unwrap();

        for pos in 0..2 {
            let addr = store.stage_address(pos).unwrap();
            assert_eq!(store.stage_at_address(addr), Ok(pos));
        }
        assert_eq!(store.stage_address(0), Ok(RECIPE_START));
        assert_eq!(store.stage_at_address(RECIPE_START + 9), Ok(0));
        assert_eq!(store.stage_at_address(store.end_address()), Err(Error::NotFound));
    }

    #[test]
    fn test_unencodable_values_rejected() {
        let mut store = store(64);
        assert_eq!(store.set_stage(0, 10.0, 65.5, 1.0), Err(Error::InvalidArgument));
        assert_eq!(store.set_stage(0, -1.0, 65.0, 1.0), Err(Error::InvalidArgument));
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        assert_eq!(
            store.add_process(0, ControlProcess::new(5, 6, f32::NAN, 1.0)),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            store.add_process(1, ControlProcess::new(5, 6, 70.0, 1.0)),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_corrupt_image_only_clears() {
        let mut eeprom = MemEeprom::<64>::new();
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.flush(&mut eeprom).unwrap();

        // Break the process marker of stage 0
        eeprom.write(RECIPE_START + 4, 7).unwrap();
        let mut store = RecipeStore::open(Region::load(&eeprom).unwrap());
        assert_eq!(store.validate(), Err(Error::CorruptStore));
        assert_eq!(store.stage_count(), Err(Error::CorruptStore));
        assert_eq!(store.set_stage(0, 1.0, 1.0, 1.0), Err(Error::CorruptStore));

        store.clear(&ConfigHeader::new(26, 6)).unwrap();
        assert!(store.validate().is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reopen_from_device() {
        let mut eeprom = MemEeprom::<64>::new();
        let mut store = store(64);
        store.set_stage(0, 10.0, 65.0, 1.0).unwrap();
        store.add_process(0, ControlProcess::new(5, 6, 70.0, 2.0)).unwrap();
        store.flush(&mut eeprom).unwrap();

        let reopened = RecipeStore::open(Region::load(&eeprom).unwrap());
        assert_eq!(reopened.end_address(), store.end_address());
        assert_eq!(reopened.stage(0), store.stage(0));
        assert_eq!(reopened.header(), Some(ConfigHeader::new(26, 6)));
    }
}
