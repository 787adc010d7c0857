//! Script folding between traditional and simplified Chinese.
//!
//! Text is folded to a canonical form (NFKC, lowercase, simplified script) so
//! that a query typed in either script matches text recognized in the other.
//! The variant form maps the canonical text back to traditional script and is
//! used by literal containment queries.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// (traditional, simplified). When several traditional characters share one
/// simplified form, the first listed is used for the reverse direction.
const VARIANT_PAIRS: &[(char, char)] = &[
    ('發', '发'), ('髮', '发'), ('門', '门'), ('們', '们'), ('開', '开'),
    ('關', '关'), ('間', '间'), ('問', '问'), ('聞', '闻'), ('閱', '阅'),
    ('閉', '闭'), ('闖', '闯'), ('閃', '闪'), ('閣', '阁'), ('闊', '阔'),
    ('車', '车'), ('軟', '软'), ('轉', '转'), ('輪', '轮'), ('輸', '输'),
    ('載', '载'), ('較', '较'), ('輕', '轻'), ('軍', '军'), ('軌', '轨'),
    ('輔', '辅'), ('輛', '辆'), ('輯', '辑'), ('連', '连'), ('運', '运'),
    ('過', '过'), ('還', '还'), ('這', '这'), ('進', '进'), ('遠', '远'),
    ('違', '违'), ('達', '达'), ('遲', '迟'), ('選', '选'), ('遺', '遗'),
    ('邊', '边'), ('遞', '递'), ('適', '适'), ('遙', '遥'), ('邏', '逻'),
    ('國', '国'), ('圖', '图'), ('團', '团'), ('圍', '围'), ('園', '园'),
    ('圓', '圆'), ('場', '场'), ('塊', '块'), ('壞', '坏'), ('壓', '压'),
    ('報', '报'), ('執', '执'), ('聲', '声'), ('賣', '卖'), ('買', '买'),
    ('貨', '货'), ('貴', '贵'), ('費', '费'), ('資', '资'), ('賬', '账'),
    ('財', '财'), ('貼', '贴'), ('質', '质'), ('購', '购'), ('貿', '贸'),
    ('負', '负'), ('責', '责'), ('貸', '贷'), ('賽', '赛'), ('贈', '赠'),
    ('貝', '贝'), ('賺', '赚'), ('貢', '贡'), ('販', '贩'), ('貧', '贫'),
    ('貫', '贯'), ('賀', '贺'), ('賓', '宾'), ('賠', '赔'), ('賢', '贤'),
    ('賭', '赌'), ('贊', '赞'), ('讚', '赞'), ('贏', '赢'), ('價', '价'),
    ('個', '个'), ('來', '来'), ('倆', '俩'), ('優', '优'), ('傳', '传'),
    ('債', '债'), ('傷', '伤'), ('僅', '仅'), ('側', '侧'), ('備', '备'),
    ('億', '亿'), ('儲', '储'), ('兒', '儿'), ('內', '内'), ('兩', '两'),
    ('冊', '册'), ('凍', '冻'), ('別', '别'), ('創', '创'), ('劃', '划'),
    ('劇', '剧'), ('劍', '剑'), ('動', '动'), ('務', '务'), ('勞', '劳'),
    ('勢', '势'), ('勵', '励'), ('區', '区'), ('醫', '医'), ('華', '华'),
    ('協', '协'), ('單', '单'), ('衛', '卫'), ('廠', '厂'), ('廣', '广'),
    ('廳', '厅'), ('歷', '历'), ('曆', '历'), ('厲', '厉'), ('參', '参'),
    ('變', '变'), ('號', '号'), ('嗎', '吗'), ('員', '员'), ('啟', '启'),
    ('喚', '唤'), ('嘗', '尝'), ('嚴', '严'), ('囑', '嘱'), ('壽', '寿'),
    ('夢', '梦'), ('奪', '夺'), ('奮', '奋'), ('媽', '妈'), ('婦', '妇'),
    ('嬰', '婴'), ('學', '学'), ('寶', '宝'), ('實', '实'), ('寫', '写'),
    ('審', '审'), ('寬', '宽'), ('對', '对'), ('導', '导'), ('將', '将'),
    ('屬', '属'), ('層', '层'), ('歲', '岁'), ('島', '岛'), ('嶺', '岭'),
    ('幣', '币'), ('帥', '帅'), ('師', '师'), ('帳', '帐'), ('帶', '带'),
    ('幫', '帮'), ('幹', '干'), ('幾', '几'), ('庫', '库'), ('廢', '废'),
    ('異', '异'), ('張', '张'), ('強', '强'), ('彈', '弹'), ('當', '当'),
    ('錄', '录'), ('彙', '汇'), ('後', '后'), ('從', '从'), ('復', '复'),
    ('複', '复'), ('徵', '征'), ('態', '态'), ('總', '总'), ('戀', '恋'),
    ('懷', '怀'), ('懶', '懒'), ('戰', '战'), ('戲', '戏'), ('戶', '户'),
    ('掃', '扫'), ('掛', '挂'), ('採', '采'), ('換', '换'), ('揚', '扬'),
    ('擇', '择'), ('擊', '击'), ('擔', '担'), ('據', '据'), ('擴', '扩'),
    ('攝', '摄'), ('攤', '摊'), ('敗', '败'), ('敵', '敌'), ('數', '数'),
    ('斷', '断'), ('於', '于'), ('時', '时'), ('晝', '昼'), ('書', '书'),
    ('會', '会'), ('條', '条'), ('東', '东'), ('極', '极'), ('構', '构'),
    ('槍', '枪'), ('樂', '乐'), ('標', '标'), ('樓', '楼'), ('機', '机'),
    ('檔', '档'), ('檢', '检'), ('權', '权'), ('歡', '欢'), ('歸', '归'),
    ('殺', '杀'), ('氣', '气'), ('漢', '汉'), ('湯', '汤'), ('溫', '温'),
    ('滿', '满'), ('濟', '济'), ('測', '测'), ('準', '准'), ('潔', '洁'),
    ('濕', '湿'), ('灣', '湾'), ('燈', '灯'), ('熱', '热'), ('營', '营'),
    ('爭', '争'), ('爺', '爷'), ('牆', '墙'), ('獎', '奖'), ('獨', '独'),
    ('猶', '犹'), ('獲', '获'), ('環', '环'), ('現', '现'), ('產', '产'),
    ('畫', '画'), ('療', '疗'), ('盡', '尽'), ('監', '监'), ('盤', '盘'),
    ('眾', '众'), ('衆', '众'), ('礎', '础'), ('確', '确'), ('禮', '礼'),
    ('種', '种'), ('稱', '称'), ('穩', '稳'), ('窮', '穷'), ('競', '竞'),
    ('筆', '笔'), ('節', '节'), ('範', '范'), ('築', '筑'), ('簡', '简'),
    ('類', '类'), ('糧', '粮'), ('紅', '红'), ('約', '约'), ('級', '级'),
    ('紀', '纪'), ('紙', '纸'), ('純', '纯'), ('細', '细'), ('組', '组'),
    ('結', '结'), ('絕', '绝'), ('統', '统'), ('絲', '丝'), ('經', '经'),
    ('綠', '绿'), ('網', '网'), ('線', '线'), ('編', '编'), ('練', '练'),
    ('緊', '紧'), ('縣', '县'), ('績', '绩'), ('續', '续'), ('紡', '纺'),
    ('紋', '纹'), ('納', '纳'), ('紐', '纽'), ('紛', '纷'), ('終', '终'),
    ('給', '给'), ('絡', '络'), ('綜', '综'), ('維', '维'), ('綱', '纲'),
    ('緒', '绪'), ('緣', '缘'), ('緩', '缓'), ('縮', '缩'), ('織', '织'),
    ('繩', '绳'), ('繪', '绘'), ('繳', '缴'), ('纖', '纤'), ('糾', '纠'),
    ('罰', '罚'), ('羅', '罗'), ('義', '义'), ('習', '习'), ('職', '职'),
    ('聯', '联'), ('聽', '听'), ('肅', '肃'), ('腦', '脑'), ('腳', '脚'),
    ('臉', '脸'), ('脫', '脱'), ('腫', '肿'), ('膽', '胆'), ('膚', '肤'),
    ('臺', '台'), ('颱', '台'), ('與', '与'), ('興', '兴'), ('舉', '举'),
    ('舊', '旧'), ('艦', '舰'), ('藝', '艺'), ('艱', '艰'), ('葉', '叶'),
    ('著', '着'), ('蘭', '兰'), ('藥', '药'), ('莊', '庄'), ('蓋', '盖'),
    ('蔥', '葱'), ('蘇', '苏'), ('蘋', '苹'), ('處', '处'), ('蟲', '虫'),
    ('蝦', '虾'), ('術', '术'), ('衝', '冲'), ('補', '补'), ('裝', '装'),
    ('製', '制'), ('裡', '里'), ('裏', '里'), ('褲', '裤'), ('襪', '袜'),
    ('見', '见'), ('規', '规'), ('視', '视'), ('親', '亲'), ('覺', '觉'),
    ('覽', '览'), ('觀', '观'), ('計', '计'), ('訂', '订'), ('記', '记'),
    ('討', '讨'), ('訓', '训'), ('訊', '讯'), ('設', '设'), ('許', '许'),
    ('訴', '诉'), ('診', '诊'), ('詞', '词'), ('試', '试'), ('詩', '诗'),
    ('話', '话'), ('該', '该'), ('詳', '详'), ('認', '认'), ('誤', '误'),
    ('說', '说'), ('請', '请'), ('調', '调'), ('談', '谈'), ('論', '论'),
    ('謝', '谢'), ('證', '证'), ('識', '识'), ('譯', '译'), ('議', '议'),
    ('護', '护'), ('讀', '读'), ('讓', '让'), ('訪', '访'), ('評', '评'),
    ('詢', '询'), ('誠', '诚'), ('誰', '谁'), ('課', '课'), ('講', '讲'),
    ('謹', '谨'), ('譜', '谱'), ('豐', '丰'), ('趕', '赶'), ('趙', '赵'),
    ('趨', '趋'), ('跡', '迹'), ('踐', '践'), ('躍', '跃'), ('農', '农'),
    ('郵', '邮'), ('鄉', '乡'), ('鄰', '邻'), ('醬', '酱'), ('釋', '释'),
    ('針', '针'), ('鈔', '钞'), ('鈴', '铃'), ('鉛', '铅'), ('銀', '银'),
    ('銷', '销'), ('鋼', '钢'), ('錢', '钱'), ('錯', '错'), ('鍵', '键'),
    ('鎖', '锁'), ('鏡', '镜'), ('鐘', '钟'), ('鐵', '铁'), ('鋪', '铺'),
    ('鍋', '锅'), ('鎮', '镇'), ('鏈', '链'), ('長', '长'), ('陽', '阳'),
    ('陰', '阴'), ('陳', '陈'), ('陸', '陆'), ('隊', '队'), ('階', '阶'),
    ('際', '际'), ('隨', '随'), ('險', '险'), ('隱', '隐'), ('陣', '阵'),
    ('雙', '双'), ('雜', '杂'), ('雞', '鸡'), ('離', '离'), ('難', '难'),
    ('雖', '虽'), ('雲', '云'), ('電', '电'), ('靈', '灵'), ('霧', '雾'),
    ('靜', '静'), ('韓', '韩'), ('韻', '韵'), ('響', '响'), ('頁', '页'),
    ('頂', '顶'), ('項', '项'), ('順', '顺'), ('須', '须'), ('預', '预'),
    ('領', '领'), ('頭', '头'), ('題', '题'), ('額', '额'), ('顏', '颜'),
    ('願', '愿'), ('顧', '顾'), ('顯', '显'), ('頓', '顿'), ('頻', '频'),
    ('顆', '颗'), ('風', '风'), ('飛', '飞'), ('飯', '饭'), ('飲', '饮'),
    ('館', '馆'), ('餘', '余'), ('餅', '饼'), ('馬', '马'), ('驗', '验'),
    ('驚', '惊'), ('駕', '驾'), ('駛', '驶'), ('騎', '骑'), ('騙', '骗'),
    ('驅', '驱'), ('體', '体'), ('魚', '鱼'), ('鳥', '鸟'), ('鳳', '凤'),
    ('鮮', '鲜'), ('鴨', '鸭'), ('鵝', '鹅'), ('鹽', '盐'), ('麥', '麦'),
    ('黃', '黄'), ('點', '点'), ('黨', '党'), ('齊', '齐'), ('齒', '齿'),
    ('齡', '龄'), ('龍', '龙'), ('龜', '龟'), ('為', '为'), ('無', '无'),
    ('燒', '烧'), ('萬', '万'), ('樣', '样'), ('漲', '涨'), ('獻', '献'),
    ('灑', '洒'), ('災', '灾'), ('煙', '烟'), ('煩', '烦'), ('爐', '炉'),
    ('畢', '毕'), ('瘋', '疯'), ('盜', '盗'), ('碼', '码'), ('磚', '砖'),
    ('禍', '祸'), ('稅', '税'), ('積', '积'), ('竊', '窃'), ('簽', '签'),
    ('籤', '签'), ('罵', '骂'), ('罷', '罢'), ('虧', '亏'), ('蠟', '蜡'),
    ('辦', '办'), ('辭', '辞'), ('鈣', '钙'), ('隸', '隶'), ('頒', '颁'),
    ('飄', '飘'), ('飼', '饲'), ('饑', '饥'), ('鬧', '闹'), ('魯', '鲁'),
    ('麼', '么'), ('黴', '霉'), ('貓', '猫'), ('擬', '拟'), ('廈', '厦'),
    ('憑', '凭'), ('壇', '坛'), ('語', '语'), ('應', '应'), ('業', '业'),
    ('誌', '志'), ('愛', '爱'), ('係', '系'), ('決', '决'), ('鬥', '斗'),
    ('勝', '胜'), ('則', '则'), ('專', '专'), ('養', '养'),
];

static TO_SIMPLIFIED: Lazy<HashMap<char, char>> =
    Lazy::new(|| VARIANT_PAIRS.iter().copied().collect());

static TO_TRADITIONAL: Lazy<HashMap<char, char>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(VARIANT_PAIRS.len());
    for &(traditional, simplified) in VARIANT_PAIRS {
        map.entry(simplified).or_insert(traditional);
    }
    map
});

/// NFKC + lowercase, without script folding. Used for literal containment.
pub fn normalize_width_and_case(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Canonical comparable form: NFKC, lowercase, simplified script.
pub fn fold(text: &str) -> String {
    normalize_width_and_case(text)
        .chars()
        .map(|c| TO_SIMPLIFIED.get(&c).copied().unwrap_or(c))
        .collect()
}

/// Traditional-script rendering of an already folded string.
pub fn to_traditional(folded: &str) -> String {
    folded
        .chars()
        .map(|c| TO_TRADITIONAL.get(&c).copied().unwrap_or(c))
        .collect()
}

/// Both forms stored for a piece of text: (normalized, variant).
pub fn fold_with_variant(text: &str) -> (String, String) {
    let normalized = fold(text);
    let variant = to_traditional(&normalized);
    (normalized, variant)
}
