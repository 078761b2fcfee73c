//! Line-oriented SDP decoder
//!
//! Structured lines (`o=`, `c=`, `m=`, `b=` and the `rtpmap`/`fmtp`
//! attributes) are parsed with nom. Every other line type is skipped and
//! every other attribute is kept as an opaque name/value pair.

use nom::{
    bytes::complete::{tag, take_till1},
    character::complete::{digit1, space0, space1},
    combinator::{all_consuming, map_res, opt, rest},
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};
use tracing::{debug, trace};

use crate::description::SessionDescription;
use crate::error::{Result, SdpError};
use crate::media::MediaBlock;

/// Fields of an `o=` line the model keeps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin<'a> {
    pub session_id: u64,
    pub address: &'a str,
}

/// Fields of an `m=` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLine<'a> {
    pub kind: &'a str,
    pub port: u16,
    pub port_count: Option<u16>,
    pub protocol: &'a str,
    pub formats: Vec<&'a str>,
}

fn token(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn port_number(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>)(input)
}

/// `<username> <sess-id> <sess-version> <nettype> <addrtype> <address>`
pub fn origin_value(input: &str) -> IResult<&str, Origin<'_>> {
    let (input, (_username, _, session_id, _, _version, _, _net, _, _addr_type, _, address)) =
        all_consuming(tuple((
            token,
            space1,
            map_res(digit1, str::parse::<u64>),
            space1,
            token,
            space1,
            token,
            space1,
            token,
            space1,
            terminated(token, space0),
        )))(input)?;
    Ok((input, Origin { session_id, address }))
}

/// `<nettype> <addrtype> <address>[/ttl]`, returning the bare address
pub fn connection_value(input: &str) -> IResult<&str, &str> {
    let (input, (_net, _, _addr_type, _, address)) =
        all_consuming(tuple((token, space1, token, space1, terminated(token, space0))))(input)?;
    let address = address.split('/').next().unwrap_or(address);
    Ok((input, address))
}

/// `<media> <port>[/<count>] <proto> <fmt> ...`
pub fn media_value(input: &str) -> IResult<&str, MediaLine<'_>> {
    let (input, (kind, _, port, port_count, _, protocol, formats, _)) = all_consuming(tuple((
        token,
        space1,
        port_number,
        opt(preceded(tag("/"), port_number)),
        space1,
        token,
        many0(preceded(space1, token)),
        space0,
    )))(input)?;
    Ok((
        input,
        MediaLine {
            kind,
            port,
            port_count,
            protocol,
            formats,
        },
    ))
}

/// `<type>:<kbps>`
pub fn bandwidth_value(input: &str) -> IResult<&str, (&str, u32)> {
    let (input, (bw_type, _, kbps)) = all_consuming(tuple((
        take_till1(|c: char| c == ':'),
        tag(":"),
        terminated(map_res(digit1, str::parse::<u32>), space0),
    )))(input)?;
    Ok((input, (bw_type, kbps)))
}

/// `<payload type> <text>` as used by `rtpmap` and `fmtp`
pub fn payload_value(input: &str) -> IResult<&str, (u8, &str)> {
    let (input, (payload_type, _, body)) =
        tuple((map_res(digit1, str::parse::<u8>), space1, rest))(input)?;
    Ok((input, (payload_type, body.trim())))
}

fn finish<O>(result: IResult<&str, O>, line: &str, what: &str) -> Result<O> {
    result
        .map(|(_, output)| output)
        .map_err(|e| SdpError::decode(line, format!("invalid {what}: {e}")))
}

/// Decode a complete session description
///
/// Accepts LF or CRLF line endings. Fails with [`SdpError::MissingField`]
/// when no `o=` line is present and with [`SdpError::Decode`] when a
/// structured line cannot be parsed.
pub fn parse_session_description(text: &str) -> Result<SessionDescription> {
    let mut sd = SessionDescription::new(0, "");
    let mut origin_address: Option<String> = None;
    let mut session_address: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let Some((line_type, value)) = line.split_once('=') else {
            return Err(SdpError::decode(line, "expected <type>=<value>"));
        };
        if line_type.len() != 1 {
            return Err(SdpError::decode(line, "line type must be a single character"));
        }

        match line_type {
            "o" => {
                let origin = finish(origin_value(value), line, "origin")?;
                sd.set_session_id(origin.session_id);
                origin_address = Some(origin.address.to_string());
            }
            "c" => {
                let address = finish(connection_value(value), line, "connection")?;
                match sd.last_media_mut() {
                    Some(media) => {
                        media.set_address(address);
                    }
                    None => session_address = Some(address.to_string()),
                }
            }
            "b" => {
                let (bw_type, kbps) = finish(bandwidth_value(value), line, "bandwidth")?;
                match sd.last_media_mut() {
                    Some(media) => {
                        media.set_bandwidth(bw_type, kbps);
                    }
                    None => {
                        sd.set_bandwidth(bw_type, kbps);
                    }
                }
            }
            "m" => {
                let parsed = finish(media_value(value), line, "media")?;
                sd.push_media(media_block(&parsed));
            }
            "a" => parse_attribute(&mut sd, line, value)?,
            _ => trace!("Skipping SDP line: {}", line),
        }
    }

    let Some(origin_address) = origin_address else {
        return Err(SdpError::missing("o="));
    };
    sd.set_address(session_address.unwrap_or(origin_address));
    Ok(sd)
}

fn media_block(line: &MediaLine<'_>) -> MediaBlock {
    let mut block = MediaBlock::new(line.kind, line.port, line.port_count.unwrap_or(1), line.protocol);
    for format in &line.formats {
        match format.parse::<u8>() {
            Ok(payload_type) => {
                block.add_format(payload_type);
            }
            Err(_) => {
                block.add_other_format(*format);
            }
        }
    }
    block
}

fn parse_attribute(sd: &mut SessionDescription, line: &str, value: &str) -> Result<()> {
    let (name, attr_value) = value.split_once(':').unwrap_or((value, ""));

    match (name, sd.last_media_mut()) {
        ("rtpmap" | "fmtp", Some(media)) => {
            let (payload_type, body) = finish(payload_value(attr_value), line, name)?;
            if media.rtp_payload(payload_type).is_none() {
                debug!("Ignoring {} for undeclared payload type {}", name, payload_type);
                return Ok(());
            }
            let payload = media.payload_mut(payload_type);
            if name == "rtpmap" {
                payload.rtpmap = Some(body.to_string());
            } else {
                payload.fmtp = Some(body.to_string());
            }
        }
        (_, Some(media)) => {
            media.add_attribute(name, attr_value);
        }
        (_, None) => {
            sd.set_attribute(name, attr_value);
        }
    }
    Ok(())
}
