use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;

use crate::wechat::error::WechatError;

/// 解析形如 `<xml><Tag>text</Tag>...</xml>` 的扁平 XML
///
/// 根节点必须是 `<xml>`，子节点只能是文本叶子节点。
pub fn parse_xml(input: &str) -> Result<HashMap<String, String>, WechatError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut message = HashMap::new();
    let mut root_seen = false;
    let mut root_closed = false;
    // 当前所在的叶子节点及其文本
    let mut current: Option<(String, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| WechatError::MalformedXml(e.to_string()))?;

        match event {
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Start(e) => {
                let name = tag_name(e.name().as_ref())?;
                if root_closed {
                    return Err(malformed("根节点之后还有内容"));
                }
                if !root_seen {
                    if name != "xml" {
                        return Err(malformed(&format!("根节点必须是 <xml>，实际为 <{}>", name)));
                    }
                    root_seen = true;
                } else if current.is_some() {
                    return Err(malformed(&format!("不支持嵌套节点 <{}>", name)));
                } else {
                    current = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                let name = tag_name(e.name().as_ref())?;
                if !root_seen || root_closed || current.is_some() {
                    return Err(malformed(&format!("节点 <{}/> 位置不正确", name)));
                }
                message.insert(name, String::new());
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| WechatError::MalformedXml(err.to_string()))?;
                match current.as_mut() {
                    Some((_, value)) => value.push_str(&text),
                    None => return Err(malformed("文本不在叶子节点内")),
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|err| WechatError::MalformedXml(err.to_string()))?;
                match current.as_mut() {
                    Some((_, value)) => value.push_str(&text),
                    None => return Err(malformed("CDATA 不在叶子节点内")),
                }
            }
            Event::End(e) => {
                let name = tag_name(e.name().as_ref())?;
                match current.take() {
                    Some((tag, value)) if tag == name => {
                        message.insert(tag, value);
                    }
                    Some((tag, _)) => {
                        return Err(malformed(&format!("<{}> 与 </{}> 不匹配", tag, name)));
                    }
                    None if name == "xml" && root_seen && !root_closed => root_closed = true,
                    None => return Err(malformed(&format!("多余的结束标签 </{}>", name))),
                }
            }
            Event::Eof => break,
        }
    }

    if !root_closed {
        return Err(malformed("缺少 <xml> 根节点或未闭合"));
    }

    Ok(message)
}

fn tag_name(raw: &[u8]) -> Result<String, WechatError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| WechatError::MalformedXml(e.to_string()))
}

fn malformed(msg: &str) -> WechatError {
    WechatError::MalformedXml(msg.to_string())
}

/// 用 CDATA 包裹文本；内容中的 `]]>` 会被拆开
pub fn cdata(value: &str) -> String {
    format!("<![CDATA[{}]]>", value.replace("]]>", "]]]]><![CDATA[>"))
}

/// 被动回复的明文文本消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReply {
    pub to_user_name: String,
    pub from_user_name: String,
    pub create_time: i64,
    pub content: String,
}

impl TextReply {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><ToUserName>{}</ToUserName><FromUserName>{}</FromUserName><CreateTime>{}</CreateTime><MsgType>{}</MsgType><Content>{}</Content></xml>",
            cdata(&self.to_user_name),
            cdata(&self.from_user_name),
            cdata(&self.create_time.to_string()),
            cdata("text"),
            cdata(&self.content),
        )
    }
}

/// 加密后的外层回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedReply {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

impl EncryptedReply {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml><Encrypt>{}</Encrypt><MsgSignature>{}</MsgSignature><TimeStamp>{}</TimeStamp><Nonce>{}</Nonce></xml>",
            cdata(&self.encrypt),
            cdata(&self.msg_signature),
            cdata(&self.timestamp),
            cdata(&self.nonce),
        )
    }
}
