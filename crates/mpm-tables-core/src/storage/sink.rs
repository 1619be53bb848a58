use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::storage::{StorageResult, TempFileGuard, create_parent_dir, io_error, temp_path_for};

/// A streaming writer that lands at its final path only when committed.
///
/// Bytes go to a temp file next to the target. [`OutputSink::stage`] flushes
/// and fsyncs it; [`StagedFile::commit`] renames it into place. Dropping the
/// sink or the staged file before commit removes the temp file, so several
/// outputs can be staged and committed together only once all of them have
/// been written.
pub struct OutputSink {
    tmp_path: PathBuf,
    final_path: PathBuf,
    writer: io::BufWriter<fs::File>,
    guard: TempFileGuard,
}

/// A fully written, fsynced temp file awaiting its rename.
pub struct StagedFile {
    tmp_path: PathBuf,
    final_path: PathBuf,
    guard: TempFileGuard,
}

impl OutputSink {
    /// Open a sink targeting `final_path`, creating parent directories.
    pub fn open(final_path: &Path) -> StorageResult<Self> {
        create_parent_dir(final_path)?;

        let tmp_path = temp_path_for(final_path);

        // std::fs::File because Arrow writers require std::io::Write.
        let file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        let guard = TempFileGuard::new(tmp_path.clone());

        Ok(Self {
            tmp_path,
            final_path: final_path.to_path_buf(),
            writer: io::BufWriter::new(file),
            guard,
        })
    }

    /// Mutable writer handle for streaming bytes.
    pub fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    /// Flush and fsync the temp file without exposing it yet.
    pub fn stage(self) -> StorageResult<StagedFile> {
        let OutputSink {
            tmp_path,
            final_path,
            writer,
            guard,
        } = self;

        let file = writer
            .into_inner()
            .map_err(|e| io_error(&tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, e))?;

        Ok(StagedFile {
            tmp_path,
            final_path,
            guard,
        })
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl StagedFile {
    /// Final path this file will be renamed to.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Rename the temp file into place.
    pub fn commit(mut self) -> StorageResult<()> {
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| io_error(&self.final_path, e))?;
        self.guard.disarm();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dropped_sink_leaves_nothing_behind() {
        let tmp = TempDir::new().expect("tempdir");
        let target = tmp.path().join("out.csv");

        let mut sink = OutputSink::open(&target).expect("open");
        sink.writer().write_all(b"a,b\n").expect("write");
        drop(sink);

        assert_eq!(std::fs::read_dir(tmp.path()).expect("ls").count(), 0);
    }

    #[test]
    fn staged_file_appears_only_on_commit() {
        let tmp = TempDir::new().expect("tempdir");
        let target = tmp.path().join("out.csv");

        let mut sink = OutputSink::open(&target).expect("open");
        sink.writer().write_all(b"a,b\n1,2\n").expect("write");
        let staged = sink.stage().expect("stage");
        assert!(!target.exists());

        staged.commit().expect("commit");
        assert_eq!(std::fs::read(&target).expect("read"), b"a,b\n1,2\n");
    }

    #[test]
    fn dropped_staged_file_is_removed() {
        let tmp = TempDir::new().expect("tempdir");
        let target = tmp.path().join("out.csv");

        let sink = OutputSink::open(&target).expect("open");
        drop(sink.stage().expect("stage"));

        assert_eq!(std::fs::read_dir(tmp.path()).expect("ls").count(), 0);
    }
}
