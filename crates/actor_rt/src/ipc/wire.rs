// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::work::HandlerFailure;
use crate::work::WorkId;

/// The one-time handshake message: constructor arguments for the actor. Kept separate from
/// [`WireRequest`] since it is never repeated and carries a different type parameter (`Args`
/// instead of `Msg`).
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct InitRequest<Args>(pub(crate) Args);

/// What the controlling process sends to the worker process after the handshake, in order: any
/// number of `Call`s, then exactly one `Terminate`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum WireRequest<Msg> {
    Call { work_id: WorkId, message: Msg },
    Terminate,
}

/// What the worker process sends back. `Ack` is sent immediately on receiving a `Call`, before
/// `handle` runs, so the controlling process's pump thread can observe "picked up" separately
/// from "finished" - this is what lets the capacity-1 call queue invariant survive the process
/// boundary.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) enum WireResponse<Out, Err> {
    InitAck,
    Ack { work_id: WorkId },
    Done {
        work_id: WorkId,
        payload: Result<Out, HandlerFailure<Err>>,
    },
    ShutdownAck { pid: u32 },
}

/// Encodes a value as a `bincode` byte buffer, without writing it anywhere.
///
/// Split out from [`write_frame`] so a caller that needs to tell an encode failure (non-fatal:
/// the value itself was bad) apart from a write failure (fatal: the pipe is broken) can do so -
/// see the pump thread's use of this in `process_worker`.
pub(crate) fn encode<V>(value: &V) -> Result<Vec<u8>, bincode::Error>
where
    V: Serialize,
{
    bincode::serialize(value)
}

/// Writes an already-encoded frame: a little-endian `u32` byte length, then the bytes.
pub(crate) fn write_encoded<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: Write,
{
    let len = u32::try_from(bytes.len())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)?;
    writer.flush()
}

/// Writes one length-prefixed `bincode` frame: a little-endian `u32` byte length, then the
/// encoded value. Used for both directions of the worker pipe.
pub(crate) fn write_frame<W, V>(writer: &mut W, value: &V) -> io::Result<()>
where
    W: Write,
    V: Serialize,
{
    let bytes = encode(value).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    write_encoded(writer, &bytes)
}

/// Reads one length-prefixed `bincode` frame written by [`write_frame`].
///
/// Returns `Err(UnexpectedEof)` if the peer closed the pipe before a complete length prefix
/// arrived; this is the normal way a controlling process learns its worker pipe is gone.
pub(crate) fn read_frame<R, V>(reader: &mut R) -> io::Result<V>
where
    R: Read,
    V: DeserializeOwned,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &WireRequest::<i64>::Call { work_id: 7, message: 42 }).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let decoded: WireRequest<i64> = read_frame(&mut cursor).unwrap();

        match decoded {
            WireRequest::Call { work_id, message } => {
                assert_eq!(work_id, 7);
                assert_eq!(message, 42);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn read_on_empty_stream_is_unexpected_eof() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        let result: io::Result<WireRequest<i64>> = read_frame(&mut cursor);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
