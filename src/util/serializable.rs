use std::io::{self, Cursor, Read, Write};

pub trait ByteSerializable: Sized {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        Self::read_from(&mut Cursor::new(bytes))
    }
}

pub trait KnownSize: ByteSerializable {
    fn size_on_disk() -> usize;
}
