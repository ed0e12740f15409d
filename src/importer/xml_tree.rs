// ==========================================
// 参考数据导入引擎 - XML 元素树
// ==========================================
// 职责: 将 XML 文本构建为扁平数组存储的元素树（节点以下标互相引用）
// 安全:
// - 逐事件迭代构建，不递归
// - 元素嵌套深度受 max_depth 限制
// - 拒绝 DOCTYPE（不做实体展开）
// 文本: 只保留元素第一个子元素之前的文本，标签名取本地名（忽略命名空间前缀）
// ==========================================

use crate::importer::error::{ImportError, ImportResult, ValidationReason};
use crate::security::structure_validator::check_xml_depth;
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// 解析 XML 文本
    ///
    /// # 参数
    /// - file: 文件名（用于错误信息）
    /// - content: XML 文本
    /// - max_depth: 最大嵌套深度（根元素为 1）
    pub fn parse(file: &str, content: &str, max_depth: usize) -> ImportResult<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let parse_error = |message: String| ImportError::XmlParseError {
            file: file.to_string(),
            message,
        };

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(parse_error(format!(
                        "位置 {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
            };

            match event {
                Event::Start(start) => {
                    let name = local_name(start.local_name().as_ref());
                    let idx = open_element(&mut nodes, &open, name, file, max_depth)?;
                    open.push(idx);
                }
                Event::Empty(start) => {
                    let name = local_name(start.local_name().as_ref());
                    open_element(&mut nodes, &open, name, file, max_depth)?;
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Text(text) => {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| parse_error(format!("文本反转义失败: {}", e)))?;
                    append_text(&mut nodes, &open, &unescaped);
                }
                Event::CData(cdata) => {
                    let raw = String::from_utf8_lossy(&cdata).into_owned();
                    append_text(&mut nodes, &open, &raw);
                }
                Event::DocType(_) => {
                    return Err(ImportError::validation(file, ValidationReason::DoctypeForbidden));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if nodes.is_empty() {
            return Err(parse_error("缺少根元素".to_string()));
        }
        if !open.is_empty() {
            return Err(parse_error("元素未闭合".to_string()));
        }

        Ok(Self { nodes })
    }

    /// 根元素下标
    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, idx: usize) -> &XmlNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 按文档顺序返回所有同名后代（不含自身）
    pub fn descendants_named(&self, idx: usize, name: &str) -> Vec<usize> {
        let mut found = Vec::new();
        let mut stack: Vec<usize> = self.nodes[idx].children.iter().rev().copied().collect();

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.name == name {
                found.push(current);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// 第一个同名后代（不含自身）
    pub fn first_descendant_named(&self, idx: usize, name: &str) -> Option<usize> {
        let mut stack: Vec<usize> = self.nodes[idx].children.iter().rev().copied().collect();

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.name == name {
                return Some(current);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    /// 第一个同名后代的文本（去首尾空白，空文本视为不存在）
    pub fn child_text(&self, idx: usize, name: &str) -> Option<&str> {
        self.first_descendant_named(idx, name)
            .map(|found| self.nodes[found].text.trim())
            .filter(|text| !text.is_empty())
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn open_element(
    nodes: &mut Vec<XmlNode>,
    open: &[usize],
    name: String,
    file: &str,
    max_depth: usize,
) -> ImportResult<usize> {
    let parent = open.last().copied();
    if parent.is_none() && !nodes.is_empty() {
        return Err(ImportError::XmlParseError {
            file: file.to_string(),
            message: format!("存在多个根元素: {}", name),
        });
    }
    check_xml_depth(open.len() + 1, max_depth).map_err(|reason| ImportError::validation(file, reason))?;

    let idx = nodes.len();
    nodes.push(XmlNode {
        name,
        text: String::new(),
        children: Vec::new(),
        parent,
    });
    if let Some(parent) = parent {
        nodes[parent].children.push(idx);
    }
    Ok(idx)
}

fn append_text(nodes: &mut [XmlNode], open: &[usize], text: &str) {
    if let Some(&current) = open.last() {
        let node = &mut nodes[current];
        if node.children.is_empty() {
            node.text.push_str(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTRIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<export>
  <countries>
    <country>
      <code>AT</code>
      <name>Austria &amp; Co</name>
      <region><code>EU</code></region>
    </country>
    <country>
      <code>DE</code>
      <name><![CDATA[Germany]]></name>
      <empty/>
    </country>
  </countries>
</export>"#;

    #[test]
    fn test_descendant_search_in_document_order() {
        let doc = XmlDocument::parse("countries.xml", COUNTRIES, 100).unwrap();
        let root = doc.root();
        assert_eq!(doc.node(root).name, "export");

        let countries = doc.descendants_named(root, "country");
        assert_eq!(countries.len(), 2);
        assert_eq!(doc.child_text(countries[0], "code"), Some("AT"));
        assert_eq!(doc.child_text(countries[0], "name"), Some("Austria & Co"));
        assert_eq!(doc.child_text(countries[1], "name"), Some("Germany"));
        assert_eq!(doc.child_text(countries[1], "empty"), None);
        assert_eq!(doc.child_text(countries[1], "missing"), None);
    }

    #[test]
    fn test_first_descendant_prefers_document_order() {
        let doc = XmlDocument::parse("countries.xml", COUNTRIES, 100).unwrap();
        let first = doc.descendants_named(doc.root(), "country")[0];
        // 直接子元素 <code> 先于 <region><code>
        assert_eq!(doc.child_text(first, "code"), Some("AT"));
        let region = doc.first_descendant_named(first, "region").unwrap();
        assert_eq!(doc.child_text(region, "code"), Some("EU"));
    }

    #[test]
    fn test_namespace_prefix_ignored() {
        let xml = r#"<ns:root xmlns:ns="urn:x"><ns:item><ns:code>A</ns:code></ns:item></ns:root>"#;
        let doc = XmlDocument::parse("ns.xml", xml, 10).unwrap();
        let items = doc.descendants_named(doc.root(), "item");
        assert_eq!(items.len(), 1);
        assert_eq!(doc.child_text(items[0], "code"), Some("A"));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}{}", "<a>".repeat(6), "</a>".repeat(6));
        assert!(XmlDocument::parse("deep.xml", &deep, 6).is_ok());
        let err = XmlDocument::parse("deep.xml", &deep, 5).unwrap_err();
        assert_eq!(
            err.validation_reason(),
            Some(&ValidationReason::NestingTooDeep { depth: 6, max: 5 })
        );
    }

    #[test]
    fn test_doctype_rejected() {
        let xml = r#"<?xml version="1.0"?><!DOCTYPE lolz [<!ENTITY lol "lol">]><lolz>&lol;</lolz>"#;
        let err = XmlDocument::parse("bomb.xml", xml, 100).unwrap_err();
        assert_eq!(err.validation_reason(), Some(&ValidationReason::DoctypeForbidden));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            XmlDocument::parse("bad.xml", "<a><b></a>", 100),
            Err(ImportError::XmlParseError { .. })
        ));
        assert!(matches!(
            XmlDocument::parse("empty.xml", "", 100),
            Err(ImportError::XmlParseError { .. })
        ));
    }
}
