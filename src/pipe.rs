//! One-shot pipe used to forward exec failures from the forked child back
//! to the debugger. The write end is opened close-on-exec, so a successful
//! exec closes it and the parent's read returns empty.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::OwnedFd;

use nix::fcntl::OFlag;
use nix::unistd;

use crate::errors::Result;

pub(crate) struct Pipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl Pipe {
    pub(crate) fn new(close_on_exec: bool) -> Result<Self> {
        let flags = if close_on_exec {
            OFlag::O_CLOEXEC
        } else {
            OFlag::empty()
        };
        let (read, write) = unistd::pipe2(flags)?;
        Ok(Self {
            read: Some(read),
            write: Some(write),
        })
    }

    pub(crate) fn close_read(&mut self) {
        self.read.take();
    }

    pub(crate) fn close_write(&mut self) {
        self.write.take();
    }

    /// Drains the read end to end of file. Consumes the end, so the call
    /// blocks only until every write end is gone.
    pub(crate) fn read_all(&mut self) -> Result<Vec<u8>> {
        let fd = self.read.take().expect("read end already consumed");
        let mut buf = Vec::new();
        File::from(fd).read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Writes `data` and closes the write end.
    pub(crate) fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let fd = self.write.take().expect("write end already consumed");
        File::from(fd).write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut pipe = Pipe::new(false).unwrap();
        pipe.write_all(b"exec failed").unwrap();
        assert_eq!(pipe.read_all().unwrap(), b"exec failed");
    }

    #[test]
    fn test_empty_when_write_end_dropped() {
        let mut pipe = Pipe::new(false).unwrap();
        pipe.close_write();
        assert!(pipe.read_all().unwrap().is_empty());
    }
}
