//! Kangxi and supplementary CJK radical code points mapped to the unified
//! ideograph they stand for. Radicals show up in text pasted from PDFs and
//! OCR output; they look identical to the ideograph but miss every dictionary.

/// Sorted by radical code point.
pub const RADICAL_TO_IDEOGRAPH: [(char, char); 216] = [
    ('\u{2E9F}', '母'), ('\u{2EF3}', '龟'), ('\u{2F00}', '一'), ('\u{2F01}', '丨'),
    ('\u{2F02}', '丶'), ('\u{2F03}', '丿'), ('\u{2F04}', '乙'), ('\u{2F05}', '亅'),
    ('\u{2F06}', '二'), ('\u{2F07}', '亠'), ('\u{2F08}', '人'), ('\u{2F09}', '儿'),
    ('\u{2F0A}', '入'), ('\u{2F0B}', '八'), ('\u{2F0C}', '冂'), ('\u{2F0D}', '冖'),
    ('\u{2F0E}', '冫'), ('\u{2F0F}', '几'), ('\u{2F10}', '凵'), ('\u{2F11}', '刀'),
    ('\u{2F12}', '力'), ('\u{2F13}', '勹'), ('\u{2F14}', '匕'), ('\u{2F15}', '匚'),
    ('\u{2F16}', '匸'), ('\u{2F17}', '十'), ('\u{2F18}', '卜'), ('\u{2F19}', '卩'),
    ('\u{2F1A}', '厂'), ('\u{2F1B}', '厶'), ('\u{2F1C}', '又'), ('\u{2F1D}', '口'),
    ('\u{2F1E}', '囗'), ('\u{2F1F}', '土'), ('\u{2F20}', '士'), ('\u{2F21}', '夂'),
    ('\u{2F22}', '夊'), ('\u{2F23}', '夕'), ('\u{2F24}', '大'), ('\u{2F25}', '女'),
    ('\u{2F26}', '子'), ('\u{2F27}', '宀'), ('\u{2F28}', '寸'), ('\u{2F29}', '小'),
    ('\u{2F2A}', '尢'), ('\u{2F2B}', '尸'), ('\u{2F2C}', '屮'), ('\u{2F2D}', '山'),
    ('\u{2F2E}', '巛'), ('\u{2F2F}', '工'), ('\u{2F30}', '己'), ('\u{2F31}', '巾'),
    ('\u{2F32}', '干'), ('\u{2F33}', '幺'), ('\u{2F34}', '广'), ('\u{2F35}', '廴'),
    ('\u{2F36}', '廾'), ('\u{2F37}', '弋'), ('\u{2F38}', '弓'), ('\u{2F39}', '彐'),
    ('\u{2F3A}', '彡'), ('\u{2F3B}', '彳'), ('\u{2F3C}', '心'), ('\u{2F3D}', '戈'),
    ('\u{2F3E}', '戶'), ('\u{2F3F}', '手'), ('\u{2F40}', '支'), ('\u{2F41}', '攴'),
    ('\u{2F42}', '文'), ('\u{2F43}', '斗'), ('\u{2F44}', '斤'), ('\u{2F45}', '方'),
    ('\u{2F46}', '无'), ('\u{2F47}', '日'), ('\u{2F48}', '曰'), ('\u{2F49}', '月'),
    ('\u{2F4A}', '木'), ('\u{2F4B}', '欠'), ('\u{2F4C}', '止'), ('\u{2F4D}', '歹'),
    ('\u{2F4E}', '殳'), ('\u{2F4F}', '毋'), ('\u{2F50}', '比'), ('\u{2F51}', '毛'),
    ('\u{2F52}', '氏'), ('\u{2F53}', '气'), ('\u{2F54}', '水'), ('\u{2F55}', '火'),
    ('\u{2F56}', '爪'), ('\u{2F57}', '父'), ('\u{2F58}', '爻'), ('\u{2F59}', '爿'),
    ('\u{2F5A}', '片'), ('\u{2F5B}', '牙'), ('\u{2F5C}', '牛'), ('\u{2F5D}', '犬'),
    ('\u{2F5E}', '玄'), ('\u{2F5F}', '玉'), ('\u{2F60}', '瓜'), ('\u{2F61}', '瓦'),
    ('\u{2F62}', '甘'), ('\u{2F63}', '生'), ('\u{2F64}', '用'), ('\u{2F65}', '田'),
    ('\u{2F66}', '疋'), ('\u{2F67}', '疒'), ('\u{2F68}', '癶'), ('\u{2F69}', '白'),
    ('\u{2F6A}', '皮'), ('\u{2F6B}', '皿'), ('\u{2F6C}', '目'), ('\u{2F6D}', '矛'),
    ('\u{2F6E}', '矢'), ('\u{2F6F}', '石'), ('\u{2F70}', '示'), ('\u{2F71}', '禸'),
    ('\u{2F72}', '禾'), ('\u{2F73}', '穴'), ('\u{2F74}', '立'), ('\u{2F75}', '竹'),
    ('\u{2F76}', '米'), ('\u{2F77}', '糸'), ('\u{2F78}', '缶'), ('\u{2F79}', '网'),
    ('\u{2F7A}', '羊'), ('\u{2F7B}', '羽'), ('\u{2F7C}', '老'), ('\u{2F7D}', '而'),
    ('\u{2F7E}', '耒'), ('\u{2F7F}', '耳'), ('\u{2F80}', '聿'), ('\u{2F81}', '肉'),
    ('\u{2F82}', '臣'), ('\u{2F83}', '自'), ('\u{2F84}', '至'), ('\u{2F85}', '臼'),
    ('\u{2F86}', '舌'), ('\u{2F87}', '舛'), ('\u{2F88}', '舟'), ('\u{2F89}', '艮'),
    ('\u{2F8A}', '色'), ('\u{2F8B}', '艸'), ('\u{2F8C}', '虍'), ('\u{2F8D}', '虫'),
    ('\u{2F8E}', '血'), ('\u{2F8F}', '行'), ('\u{2F90}', '衣'), ('\u{2F91}', '襾'),
    ('\u{2F92}', '見'), ('\u{2F93}', '角'), ('\u{2F94}', '言'), ('\u{2F95}', '谷'),
    ('\u{2F96}', '豆'), ('\u{2F97}', '豕'), ('\u{2F98}', '豸'), ('\u{2F99}', '貝'),
    ('\u{2F9A}', '赤'), ('\u{2F9B}', '走'), ('\u{2F9C}', '足'), ('\u{2F9D}', '身'),
    ('\u{2F9E}', '車'), ('\u{2F9F}', '辛'), ('\u{2FA0}', '辰'), ('\u{2FA1}', '辵'),
    ('\u{2FA2}', '邑'), ('\u{2FA3}', '酉'), ('\u{2FA4}', '釆'), ('\u{2FA5}', '里'),
    ('\u{2FA6}', '金'), ('\u{2FA7}', '長'), ('\u{2FA8}', '門'), ('\u{2FA9}', '阜'),
    ('\u{2FAA}', '隶'), ('\u{2FAB}', '隹'), ('\u{2FAC}', '雨'), ('\u{2FAD}', '靑'),
    ('\u{2FAE}', '非'), ('\u{2FAF}', '面'), ('\u{2FB0}', '革'), ('\u{2FB1}', '韋'),
    ('\u{2FB2}', '韭'), ('\u{2FB3}', '音'), ('\u{2FB4}', '頁'), ('\u{2FB5}', '風'),
    ('\u{2FB6}', '飛'), ('\u{2FB7}', '食'), ('\u{2FB8}', '首'), ('\u{2FB9}', '香'),
    ('\u{2FBA}', '馬'), ('\u{2FBB}', '骨'), ('\u{2FBC}', '高'), ('\u{2FBD}', '髟'),
    ('\u{2FBE}', '鬥'), ('\u{2FBF}', '鬯'), ('\u{2FC0}', '鬲'), ('\u{2FC1}', '鬼'),
    ('\u{2FC2}', '魚'), ('\u{2FC3}', '鳥'), ('\u{2FC4}', '鹵'), ('\u{2FC5}', '鹿'),
    ('\u{2FC6}', '麥'), ('\u{2FC7}', '麻'), ('\u{2FC8}', '黃'), ('\u{2FC9}', '黍'),
    ('\u{2FCA}', '黑'), ('\u{2FCB}', '黹'), ('\u{2FCC}', '黽'), ('\u{2FCD}', '鼎'),
    ('\u{2FCE}', '鼓'), ('\u{2FCF}', '鼠'), ('\u{2FD0}', '鼻'), ('\u{2FD1}', '齊'),
    ('\u{2FD2}', '齒'), ('\u{2FD3}', '龍'), ('\u{2FD4}', '龜'), ('\u{2FD5}', '龠'),
];

/// Unified ideograph for a radical code point, if `c` is one.
pub fn radical_ideograph(c: char) -> Option<char> {
    RADICAL_TO_IDEOGRAPH
        .binary_search_by_key(&c, |(radical, _)| *radical)
        .ok()
        .map(|index| RADICAL_TO_IDEOGRAPH[index].1)
}
