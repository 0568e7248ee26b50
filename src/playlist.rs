use crate::models::MatchedTrack;
use std::io::Write;
use std::path::Path;

/// Write an extended M3U playlist for imported tracks.
///
/// - Header `#EXTM3U`.
/// - One `#EXTINF:<seconds>,<artist> - <title>` line per track (`-1` when the
///   duration is unknown), followed by the location from `location_of`.
pub fn write_m3u<F>(playlist_path: &Path, tracks: &[MatchedTrack], location_of: F) -> anyhow::Result<()>
where
    F: Fn(&MatchedTrack) -> String,
{
    let mut file = std::io::BufWriter::new(std::fs::File::create(playlist_path)?);
    write_m3u_to(&mut file, tracks, location_of)?;
    file.flush()?;
    Ok(())
}

pub fn write_m3u_to<W, F>(out: &mut W, tracks: &[MatchedTrack], location_of: F) -> std::io::Result<()>
where
    W: Write,
    F: Fn(&MatchedTrack) -> String,
{
    writeln!(out, "#EXTM3U")?;
    for t in tracks {
        let secs = t.duration_secs.map(|d| d as i64).unwrap_or(-1);
        writeln!(out, "#EXTINF:{},{} - {}", secs, single_line(&t.artist), single_line(&t.title))?;
        writeln!(out, "{}", location_of(t))?;
    }
    Ok(())
}

// a newline would split the entry
fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
